use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;

use super::channel::ByteChannel;
use super::frame_reader::FrameReader;
use crate::codec::cobs::max_stuffed_len;
use crate::codec::crc32::checksum;
use crate::codec::{
    AckStatus, BootState, Command, DeviceStatus, Frame, Response, decode_command, encode_response,
};
use crate::error::{ChannelError, FixtureError};
use crate::protocol::{BANK_COUNT, FIRMWARE_BANK_SIZE, FRAME_DELIMITER, MAX_DATA_BLOCK_SIZE};

const MAX_COMMAND_FRAME_LEN: usize = max_stuffed_len(MAX_DATA_BLOCK_SIZE + 32);
const SIMULATED_CHANNEL_NAME: &str = "fake:simulated";
const SCRIPTED_CHANNEL_NAME: &str = "fake:scripted";

/// One hex-encoded frame fixture, e.g. `"03 00 05 00"`.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Into)]
pub struct HexFrame {
    bytes: Vec<u8>,
}

impl FromStr for HexFrame {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let compact: String = value.split_whitespace().collect();
        if compact.is_empty() {
            return Err(FixtureError::EmptyFrame);
        }
        let bytes = hex::decode(&compact).map_err(|source| FixtureError::InvalidHex {
            value: value.trim().to_string(),
            source,
        })?;
        Ok(Self { bytes })
    }
}

/// Canned response frames, in the order they are released.
///
/// Parsed from `;`-separated hex frames.
#[derive(Debug, Clone, Eq, PartialEq, Default, derive_more::Into)]
pub struct ScriptedResponses {
    frames: Vec<Vec<u8>>,
}

impl ScriptedResponses {
    /// Creates a script from already-encoded frames.
    #[must_use]
    pub fn new<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Vec<u8>>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromStr for ScriptedResponses {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let frames = value
            .split(';')
            .map(|raw_frame| raw_frame.parse::<HexFrame>().map(Into::into))
            .collect::<Result<Vec<Vec<u8>>, _>>()?;
        Ok(Self { frames })
    }
}

/// Settings for a simulated bootloader.
#[derive(Debug, Clone, Builder)]
pub struct FakeDeviceConfig {
    /// Bank the device reports as active at start.
    #[builder(default)]
    active_bank: u8,
    /// Preloads bank A with a valid image of this version.
    version_a: Option<u32>,
    /// Preloads bank B with a valid image of this version.
    version_b: Option<u32>,
    /// Largest image `StartUpdate` accepts.
    #[builder(default = FIRMWARE_BANK_SIZE)]
    max_image_size: u32,
    /// Stop answering once this many commands have been handled.
    silent_after: Option<usize>,
    /// Answer `FlashError` to the data block covering this image offset.
    flash_error_at: Option<u32>,
    /// Corrupt the stored byte at this image offset so verification fails.
    corrupt_byte_at: Option<u32>,
    /// Bytes already waiting on the line before the first command.
    #[builder(default)]
    stale_input: Vec<u8>,
}

impl Default for FakeDeviceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
struct BankSlot {
    image: Vec<u8>,
    version: u32,
    crc32: u32,
    size: u32,
}

impl BankSlot {
    fn preloaded(bank: u8, version: u32) -> Self {
        let image = format!("crispy bank {bank} firmware v{version}").into_bytes();
        let crc32 = checksum(&image);
        let size = image.len() as u32;
        Self {
            image,
            version,
            crc32,
            size,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum UpdateState {
    Idle,
    Receiving {
        bank: u8,
        size: u32,
        crc32: u32,
        version: u32,
        received: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct FaultPlan {
    silent_after: Option<usize>,
    flash_error_at: Option<u32>,
    corrupt_byte_at: Option<u32>,
}

/// In-memory model of the bootloader update state machine.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    banks: [BankSlot; BANK_COUNT as usize],
    active_bank: u8,
    state: UpdateState,
    faults: FaultPlan,
    max_image_size: u32,
    commands_handled: usize,
    reboot_count: usize,
}

impl SimulatedDevice {
    /// Creates a device from `config`.
    #[must_use]
    pub fn new(config: &FakeDeviceConfig) -> Self {
        let bank_a = config
            .version_a
            .map(|version| BankSlot::preloaded(0, version))
            .unwrap_or_default();
        let bank_b = config
            .version_b
            .map(|version| BankSlot::preloaded(1, version))
            .unwrap_or_default();

        Self {
            banks: [bank_a, bank_b],
            active_bank: config.active_bank,
            state: UpdateState::Idle,
            faults: FaultPlan {
                silent_after: config.silent_after,
                flash_error_at: config.flash_error_at,
                corrupt_byte_at: config.corrupt_byte_at,
            },
            max_image_size: config.max_image_size,
            commands_handled: 0,
            reboot_count: 0,
        }
    }

    /// Returns the status snapshot `GetStatus` would report.
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        let state = match self.state {
            UpdateState::Idle => BootState::UpdateMode,
            UpdateState::Receiving { .. } => BootState::Receiving,
        };
        DeviceStatus::new(
            self.active_bank,
            self.banks[0].version,
            self.banks[1].version,
            state,
        )
    }

    /// Returns the committed image stored in `bank`.
    #[must_use]
    pub fn bank_image(&self, bank: u8) -> Option<&[u8]> {
        let slot = self.banks.get(usize::from(bank))?;
        (slot.size > 0).then_some(slot.image.as_slice())
    }

    #[must_use]
    pub fn reboot_count(&self) -> usize {
        self.reboot_count
    }

    /// Handles one raw command frame and returns the response frame, if the
    /// device answers at all.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Option<Frame> {
        self.commands_handled += 1;
        if let Some(limit) = self.faults.silent_after
            && self.commands_handled > limit
        {
            tracing::trace!(
                commands_handled = self.commands_handled,
                "simulated device is silent"
            );
            return None;
        }

        let response = match decode_command(frame) {
            Ok(command) => self.handle_command(command),
            Err(error) => {
                tracing::debug!(%error, "simulated device rejected undecodable command");
                ack(AckStatus::BadCommand)
            }
        };
        Some(encode_response(&response))
    }

    /// Applies one decoded command.
    pub fn handle_command(&mut self, command: Command) -> Response {
        match command {
            Command::GetStatus => Response::Status(self.status()),
            Command::StartUpdate {
                bank,
                size,
                crc32,
                version,
            } => self.start_update(bank, size, crc32, version),
            Command::DataBlock { offset, data } => self.data_block(offset, &data),
            Command::FinishUpdate => self.finish_update(),
            Command::Reboot => {
                self.state = UpdateState::Idle;
                self.reboot_count += 1;
                ack(AckStatus::Ok)
            }
            Command::SetActiveBank { bank } => self.set_active_bank(bank),
            Command::WipeAll => self.wipe_all(),
        }
    }

    fn start_update(&mut self, bank: u8, size: u32, crc32: u32, version: u32) -> Response {
        if self.state != UpdateState::Idle {
            return ack(AckStatus::BadState);
        }
        if bank >= BANK_COUNT || size == 0 || size > self.max_image_size {
            return ack(AckStatus::BankInvalid);
        }

        self.banks[usize::from(bank)].image.clear();
        self.state = UpdateState::Receiving {
            bank,
            size,
            crc32,
            version,
            received: Vec::with_capacity(size as usize),
        };
        ack(AckStatus::Ok)
    }

    fn data_block(&mut self, offset: u32, data: &[u8]) -> Response {
        let faults = self.faults;
        let UpdateState::Receiving { size, received, .. } = &mut self.state else {
            return ack(AckStatus::BadState);
        };
        if offset as usize != received.len() || received.len() + data.len() > *size as usize {
            return ack(AckStatus::BadCommand);
        }

        let block = u64::from(offset)..u64::from(offset) + data.len() as u64;
        if let Some(bad_offset) = faults.flash_error_at
            && block.contains(&u64::from(bad_offset))
        {
            return ack(AckStatus::FlashError);
        }

        let start = received.len();
        received.extend_from_slice(data);
        if let Some(corrupt) = faults.corrupt_byte_at
            && block.contains(&u64::from(corrupt))
        {
            received[start + (corrupt - offset) as usize] ^= 0xFF;
        }
        ack(AckStatus::Ok)
    }

    fn finish_update(&mut self) -> Response {
        let UpdateState::Receiving {
            bank,
            size,
            crc32,
            version,
            received,
        } = &self.state
        else {
            return ack(AckStatus::BadState);
        };
        if received.len() != *size as usize {
            return ack(AckStatus::BadCommand);
        }

        let status = if checksum(received) == *crc32 {
            self.banks[usize::from(*bank)] = BankSlot {
                image: received.clone(),
                version: *version,
                crc32: *crc32,
                size: *size,
            };
            self.active_bank = *bank;
            AckStatus::Ok
        } else {
            AckStatus::CrcError
        };
        self.state = UpdateState::Idle;
        ack(status)
    }

    fn set_active_bank(&mut self, bank: u8) -> Response {
        if self.state != UpdateState::Idle {
            return ack(AckStatus::BadState);
        }
        let Some(slot) = self.banks.get(usize::from(bank)) else {
            return ack(AckStatus::BankInvalid);
        };
        if slot.size == 0 {
            return ack(AckStatus::BankInvalid);
        }
        if checksum(&slot.image) != slot.crc32 {
            return ack(AckStatus::CrcError);
        }

        self.active_bank = bank;
        ack(AckStatus::Ok)
    }

    fn wipe_all(&mut self) -> Response {
        if self.state != UpdateState::Idle {
            return ack(AckStatus::BadState);
        }
        self.banks = Default::default();
        self.active_bank = 0;
        ack(AckStatus::Ok)
    }
}

fn ack(status: AckStatus) -> Response {
    Response::Ack { status }
}

#[derive(Debug)]
struct FakeLink {
    device: SimulatedDevice,
    inbound: FrameReader,
    discarding: bool,
    pending: VecDeque<u8>,
    commands: Vec<Command>,
    closed: bool,
}

impl FakeLink {
    fn receive(&mut self, byte: u8) {
        let frame = match self.inbound.push(byte) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(error) => {
                tracing::debug!(%error, "simulated device dropping overlong frame");
                self.discarding = true;
                return;
            }
        };

        let response = if std::mem::take(&mut self.discarding) {
            Some(encode_response(&ack(AckStatus::BadCommand)))
        } else {
            if let Ok(command) = decode_command(&frame) {
                self.commands.push(command);
            }
            self.device.handle_frame(&frame)
        };
        if let Some(response) = response {
            self.pending.extend(response.as_bytes());
        }
    }
}

fn lock(link: &Mutex<FakeLink>) -> MutexGuard<'_, FakeLink> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Byte channel wired to a [`SimulatedDevice`].
///
/// Responses are produced synchronously as each command frame completes, so
/// reads never block: an empty line reports a timeout immediately.
#[derive(Debug)]
pub struct FakeChannel {
    link: Arc<Mutex<FakeLink>>,
}

impl FakeChannel {
    /// Creates a channel to a fresh device built from `config`.
    #[must_use]
    pub fn new(config: &FakeDeviceConfig) -> Self {
        Self::with_device(
            SimulatedDevice::new(config),
            config.stale_input.iter().copied(),
        )
    }

    /// Creates a channel to an existing device with `stale_input` already
    /// waiting on the line.
    #[must_use]
    pub fn with_device(device: SimulatedDevice, stale_input: impl IntoIterator<Item = u8>) -> Self {
        Self {
            link: Arc::new(Mutex::new(FakeLink {
                device,
                inbound: FrameReader::new(MAX_COMMAND_FRAME_LEN),
                discarding: false,
                pending: stale_input.into_iter().collect(),
                commands: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Returns a handle that observes the device after the channel has been
    /// moved into a session.
    #[must_use]
    pub fn handle(&self) -> FakeDeviceHandle {
        FakeDeviceHandle {
            link: Arc::clone(&self.link),
        }
    }
}

impl ByteChannel for FakeChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let mut link = lock(&self.link);
        if link.closed {
            return Err(ChannelError::Closed);
        }
        for &byte in bytes {
            link.receive(byte);
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ChannelError> {
        let mut link = lock(&self.link);
        if link.closed {
            return Err(ChannelError::Closed);
        }
        link.pending
            .pop_front()
            .ok_or_else(|| ChannelError::timeout(timeout))
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        lock(&self.link).closed = true;
        Ok(())
    }

    fn name(&self) -> String {
        SIMULATED_CHANNEL_NAME.to_string()
    }
}

/// Observer for a [`FakeChannel`]'s device.
#[derive(Debug, Clone)]
pub struct FakeDeviceHandle {
    link: Arc<Mutex<FakeLink>>,
}

impl FakeDeviceHandle {
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        lock(&self.link).device.status()
    }

    /// Returns a copy of the committed image in `bank`.
    #[must_use]
    pub fn bank_image(&self, bank: u8) -> Option<Vec<u8>> {
        lock(&self.link).device.bank_image(bank).map(<[u8]>::to_vec)
    }

    /// Returns every command the device decoded, in arrival order.
    #[must_use]
    pub fn received_commands(&self) -> Vec<Command> {
        lock(&self.link).commands.clone()
    }

    #[must_use]
    pub fn reboot_count(&self) -> usize {
        lock(&self.link).device.reboot_count()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.link).closed
    }

    /// Puts `bytes` on the line as if the device had sent them unprompted.
    pub fn inject_input(&self, bytes: &[u8]) {
        lock(&self.link).pending.extend(bytes);
    }
}

/// Shared record of every buffer written to a [`ScriptedChannel`].
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WriteLog {
    /// Returns each `write_all` buffer, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the written buffers that decode as commands.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.writes()
            .iter()
            .filter_map(|bytes| decode_command(bytes).ok())
            .collect()
    }

    fn record(&self, bytes: &[u8]) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
    }
}

/// Byte channel that answers each written frame with the next canned
/// response. Once the script runs out the line stays silent.
#[derive(Debug)]
pub struct ScriptedChannel {
    responses: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    log: WriteLog,
    closed: bool,
}

impl ScriptedChannel {
    #[must_use]
    pub fn new(responses: ScriptedResponses) -> Self {
        let frames: Vec<Vec<u8>> = responses.into();
        Self {
            responses: frames.into(),
            pending: VecDeque::new(),
            log: WriteLog::default(),
            closed: false,
        }
    }

    /// Puts `bytes` on the line before the first command.
    #[must_use]
    pub fn with_stale_input(mut self, bytes: &[u8]) -> Self {
        self.pending.extend(bytes);
        self
    }

    /// Returns a handle to the write record.
    #[must_use]
    pub fn write_log(&self) -> WriteLog {
        self.log.clone()
    }
}

impl ByteChannel for ScriptedChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.log.record(bytes);

        let completed_frames = bytes.iter().filter(|&&byte| byte == FRAME_DELIMITER).count();
        for _frame in 0..completed_frames {
            if let Some(response) = self.responses.pop_front() {
                self.pending.extend(response);
            }
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.pending
            .pop_front()
            .ok_or_else(|| ChannelError::timeout(timeout))
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> String {
        SCRIPTED_CHANNEL_NAME.to_string()
    }
}
