//! Typed commands and responses, and their framed wire encoding.
//!
//! A command payload is the opcode byte followed by its fields. Banks and
//! enum ordinals travel as raw bytes; sizes, checksums, versions, offsets and
//! lengths travel as varints. The payload is COBS-stuffed and terminated by
//! [`FRAME_DELIMITER`].

use serde::Serialize;
use strum_macros::{Display, EnumIter, FromRepr, IntoStaticStr};
use thiserror::Error;
use tracing::instrument;

use super::cobs::{self, FramingError};
use super::varint::{VarintError, decode_varint, encode_varint_into};
use crate::protocol::{
    FRAME_DELIMITER, MAX_DATA_BLOCK_SIZE, Opcode, RESPONSE_KIND_ACK, RESPONSE_KIND_STATUS,
    ResponseKind,
};

/// Errors returned while encoding or decoding messages.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MessageError {
    /// The unstuffed response carried no bytes at all.
    #[error("response frame was empty")]
    EmptyResponse,
    /// A response ended before a mandatory field.
    #[error("response is truncated: missing `{field}`")]
    TruncatedResponse { field: &'static str },
    /// The response discriminant is neither Ack nor Status.
    #[error("unknown response kind {kind}")]
    UnknownResponseKind { kind: u8 },
    /// The Ack status byte is outside the known set.
    #[error("unknown ack status {value}")]
    UnknownAckStatus { value: u8 },
    /// The boot state byte is outside the known set.
    #[error("unknown boot state {value}")]
    UnknownBootState { value: u8 },
    /// A varint field decoded to a value that does not fit its field.
    #[error("field `{field}` value {value} is out of range")]
    FieldOutOfRange { field: &'static str, value: u64 },
    /// The unstuffed command carried no bytes at all.
    #[error("command frame was empty")]
    EmptyCommand,
    /// The opcode byte is outside the known set.
    #[error("unknown opcode {value}")]
    UnknownOpcode { value: u8 },
    /// A command ended before a mandatory field.
    #[error("command is truncated: missing `{field}`")]
    TruncatedCommand { field: &'static str },
    /// A data block declared more bytes than one block may carry.
    #[error("data block of {len} bytes exceeds max {max}")]
    DataBlockTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Varint(#[from] VarintError),
}

/// Outcome code carried by an Ack response.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, FromRepr, Display, IntoStaticStr, Serialize,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok = 0,
    CrcError = 1,
    FlashError = 2,
    BadCommand = 3,
    BadState = 4,
    BankInvalid = 5,
}

impl AckStatus {
    /// Returns the raw status byte.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Returns whether the device accepted the command.
    ///
    /// ```
    /// use crispy_upload::AckStatus;
    ///
    /// assert!(AckStatus::Ok.is_ok());
    /// assert!(!AckStatus::BankInvalid.is_ok());
    /// ```
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl TryFrom<u8> for AckStatus {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(MessageError::UnknownAckStatus { value })
    }
}

/// Bootloader state reported by a Status response.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, FromRepr, Display, IntoStaticStr, Serialize,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BootState {
    Idle = 0,
    UpdateMode = 1,
    Receiving = 2,
}

impl BootState {
    /// Returns the raw state byte.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for BootState {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(MessageError::UnknownBootState { value })
    }
}

/// Snapshot of the bootloader returned by `GetStatus`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct DeviceStatus {
    active_bank: u8,
    version_a: u32,
    version_b: u32,
    state: BootState,
}

impl DeviceStatus {
    /// Creates a status snapshot.
    ///
    /// ```
    /// use crispy_upload::{BootState, DeviceStatus};
    ///
    /// let status = DeviceStatus::new(1, 3, 4, BootState::UpdateMode);
    /// assert_eq!(1, status.active_bank());
    /// assert_eq!(4, status.active_version());
    /// ```
    #[must_use]
    pub const fn new(active_bank: u8, version_a: u32, version_b: u32, state: BootState) -> Self {
        Self {
            active_bank,
            version_a,
            version_b,
            state,
        }
    }

    #[must_use]
    pub const fn active_bank(&self) -> u8 {
        self.active_bank
    }

    #[must_use]
    pub const fn version_a(&self) -> u32 {
        self.version_a
    }

    #[must_use]
    pub const fn version_b(&self) -> u32 {
        self.version_b
    }

    #[must_use]
    pub const fn state(&self) -> BootState {
        self.state
    }

    /// Returns the firmware version stored in the active bank.
    #[must_use]
    pub const fn active_version(&self) -> u32 {
        if self.active_bank == 0 {
            self.version_a
        } else {
            self.version_b
        }
    }
}

/// Host-to-device request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    GetStatus,
    StartUpdate {
        bank: u8,
        size: u32,
        crc32: u32,
        version: u32,
    },
    DataBlock {
        offset: u32,
        data: Vec<u8>,
    },
    FinishUpdate,
    Reboot,
    SetActiveBank {
        bank: u8,
    },
    WipeAll,
}

impl Command {
    /// Returns the opcode this command is sent with.
    ///
    /// ```
    /// use crispy_upload::{Command, Opcode};
    ///
    /// assert_eq!(Opcode::SetActiveBank, Command::SetActiveBank { bank: 1 }.opcode());
    /// ```
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::GetStatus => Opcode::GetStatus,
            Self::StartUpdate { .. } => Opcode::StartUpdate,
            Self::DataBlock { .. } => Opcode::DataBlock,
            Self::FinishUpdate => Opcode::FinishUpdate,
            Self::Reboot => Opcode::Reboot,
            Self::SetActiveBank { .. } => Opcode::SetActiveBank,
            Self::WipeAll => Opcode::WipeAll,
        }
    }
}

/// Device-to-host reply.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Ack { status: AckStatus },
    Status(DeviceStatus),
}

impl Response {
    /// Returns which response shape this is.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        match self {
            Self::Ack { .. } => ResponseKind::Ack,
            Self::Status(_) => ResponseKind::Status,
        }
    }
}

/// One stuffed, delimiter-terminated frame ready for the wire.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Into)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Stuffs `payload` and appends the delimiter.
    ///
    /// ```
    /// use crispy_upload::Frame;
    ///
    /// assert_eq!(&[0x02, 0x04, 0x00], Frame::from_payload(&[0x04]).as_bytes());
    /// ```
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut bytes = cobs::stuff(payload);
        bytes.push(FRAME_DELIMITER);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encodes `command` into a wire frame.
///
/// ```
/// use crispy_upload::{Command, encode_command};
///
/// assert_eq!(&[0x01, 0x01, 0x00], encode_command(&Command::GetStatus).as_bytes());
/// assert_eq!(&[0x03, 0x05, 0x01, 0x00], encode_command(&Command::SetActiveBank { bank: 1 }).as_bytes());
/// ```
#[must_use]
#[instrument(skip(command), level = "trace", fields(opcode = %command.opcode()))]
pub fn encode_command(command: &Command) -> Frame {
    let mut payload = vec![command.opcode().as_raw()];
    match command {
        Command::GetStatus | Command::FinishUpdate | Command::Reboot | Command::WipeAll => {}
        Command::StartUpdate {
            bank,
            size,
            crc32,
            version,
        } => {
            payload.push(*bank);
            encode_varint_into(u64::from(*size), &mut payload);
            encode_varint_into(u64::from(*crc32), &mut payload);
            encode_varint_into(u64::from(*version), &mut payload);
        }
        Command::DataBlock { offset, data } => {
            payload.reserve(data.len() + 2 * super::varint::MAX_VARINT_LEN);
            encode_varint_into(u64::from(*offset), &mut payload);
            encode_varint_into(data.len() as u64, &mut payload);
            payload.extend_from_slice(data);
        }
        Command::SetActiveBank { bank } => payload.push(*bank),
    }
    Frame::from_payload(&payload)
}

/// Decodes one response frame.
///
/// A single trailing delimiter is accepted and ignored.
///
/// # Errors
///
/// Returns an error when the frame is malformed, empty, truncated, or carries
/// an unknown discriminant or ordinal.
///
/// ```
/// use crispy_upload::{AckStatus, Response, decode_response};
///
/// let response = decode_response(&[0x01, 0x02, 0x05, 0x00])?;
/// assert_eq!(Response::Ack { status: AckStatus::BankInvalid }, response);
/// # Ok::<(), crispy_upload::MessageError>(())
/// ```
#[instrument(skip(frame), level = "trace", fields(frame_len = frame.len()))]
pub fn decode_response(frame: &[u8]) -> Result<Response, MessageError> {
    let payload = cobs::unstuff(strip_delimiter(frame))?;
    let Some((&kind, _)) = payload.split_first() else {
        return Err(MessageError::EmptyResponse);
    };

    let mut reader = FieldReader::new(&payload, 1, truncated_response);
    match kind {
        RESPONSE_KIND_ACK => {
            let status = AckStatus::try_from(reader.byte("status")?)?;
            Ok(Response::Ack { status })
        }
        RESPONSE_KIND_STATUS => {
            let active_bank = reader.byte("active_bank")?;
            let version_a = reader.varint_u32("version_a")?;
            let version_b = reader.varint_u32("version_b")?;
            let state = BootState::try_from(reader.byte("state")?)?;
            Ok(Response::Status(DeviceStatus::new(
                active_bank,
                version_a,
                version_b,
                state,
            )))
        }
        kind => Err(MessageError::UnknownResponseKind { kind }),
    }
}

/// Encodes `response` into a wire frame, as the bootloader would send it.
///
/// ```
/// use crispy_upload::{AckStatus, Response, encode_response};
///
/// let frame = encode_response(&Response::Ack { status: AckStatus::Ok });
/// assert_eq!(&[0x01, 0x01, 0x01, 0x00], frame.as_bytes());
/// ```
#[must_use]
pub fn encode_response(response: &Response) -> Frame {
    let mut payload = Vec::with_capacity(16);
    match response {
        Response::Ack { status } => {
            payload.push(RESPONSE_KIND_ACK);
            payload.push(status.as_raw());
        }
        Response::Status(status) => {
            payload.push(RESPONSE_KIND_STATUS);
            payload.push(status.active_bank());
            encode_varint_into(u64::from(status.version_a()), &mut payload);
            encode_varint_into(u64::from(status.version_b()), &mut payload);
            payload.push(status.state().as_raw());
        }
    }
    Frame::from_payload(&payload)
}

/// Decodes one command frame, as the bootloader would receive it.
///
/// # Errors
///
/// Returns an error when the frame is malformed, empty, truncated, carries an
/// unknown opcode, or declares a data block longer than
/// [`MAX_DATA_BLOCK_SIZE`].
#[instrument(skip(frame), level = "trace", fields(frame_len = frame.len()))]
pub fn decode_command(frame: &[u8]) -> Result<Command, MessageError> {
    let payload = cobs::unstuff(strip_delimiter(frame))?;
    let Some((&raw_opcode, _)) = payload.split_first() else {
        return Err(MessageError::EmptyCommand);
    };
    let opcode =
        Opcode::from_repr(raw_opcode).ok_or(MessageError::UnknownOpcode { value: raw_opcode })?;

    let mut reader = FieldReader::new(&payload, 1, truncated_command);
    let command = match opcode {
        Opcode::GetStatus => Command::GetStatus,
        Opcode::StartUpdate => Command::StartUpdate {
            bank: reader.byte("bank")?,
            size: reader.varint_u32("size")?,
            crc32: reader.varint_u32("crc32")?,
            version: reader.varint_u32("version")?,
        },
        Opcode::DataBlock => {
            let offset = reader.varint_u32("offset")?;
            let len = reader.varint_u32("len")? as usize;
            if len > MAX_DATA_BLOCK_SIZE {
                return Err(MessageError::DataBlockTooLarge {
                    len,
                    max: MAX_DATA_BLOCK_SIZE,
                });
            }
            Command::DataBlock {
                offset,
                data: reader.bytes(len, "data")?.to_vec(),
            }
        }
        Opcode::FinishUpdate => Command::FinishUpdate,
        Opcode::Reboot => Command::Reboot,
        Opcode::SetActiveBank => Command::SetActiveBank {
            bank: reader.byte("bank")?,
        },
        Opcode::WipeAll => Command::WipeAll,
    };
    Ok(command)
}

fn strip_delimiter(frame: &[u8]) -> &[u8] {
    frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame)
}

fn truncated_response(field: &'static str) -> MessageError {
    MessageError::TruncatedResponse { field }
}

fn truncated_command(field: &'static str) -> MessageError {
    MessageError::TruncatedCommand { field }
}

/// Cursor over an unstuffed payload that reports missing fields by name.
struct FieldReader<'a> {
    data: &'a [u8],
    position: usize,
    truncated: fn(&'static str) -> MessageError,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8], position: usize, truncated: fn(&'static str) -> MessageError) -> Self {
        Self {
            data,
            position,
            truncated,
        }
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, MessageError> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or((self.truncated)(field))?;
        self.position += 1;
        Ok(byte)
    }

    fn varint_u32(&mut self, field: &'static str) -> Result<u32, MessageError> {
        let (value, next) = decode_varint(self.data, self.position).map_err(|error| match error {
            VarintError::Truncated { .. } => (self.truncated)(field),
            VarintError::Overflow { .. } => MessageError::Varint(error),
        })?;
        self.position = next;
        u32::try_from(value).map_err(|_| MessageError::FieldOutOfRange { field, value })
    }

    fn bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], MessageError> {
        let end = self.position + len;
        let bytes = self
            .data
            .get(self.position..end)
            .ok_or((self.truncated)(field))?;
        self.position = end;
        Ok(bytes)
    }
}
