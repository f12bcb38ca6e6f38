use std::time::Duration;

use serde::Serialize;
use strum_macros::{Display, EnumIter, FromRepr, IntoStaticStr};

/// Byte that terminates every frame on the wire.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Largest payload accepted in one `DataBlock` command.
pub const MAX_DATA_BLOCK_SIZE: usize = 1024;

/// Number of firmware banks on the device (A = 0, B = 1).
pub const BANK_COUNT: u8 = 2;

/// Capacity of one firmware bank on the device.
pub const FIRMWARE_BANK_SIZE: u32 = 768 * 1024;

/// Serial baud rate used by the bootloader's CDC interface.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Per-read deadline for ordinary exchanges.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-read deadline for `StartUpdate`, which erases the target bank first.
pub const DEFAULT_START_UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest response frame the host will buffer before giving up.
pub const MAX_RESPONSE_FRAME_LEN: usize = 64;

pub(crate) const RESPONSE_KIND_ACK: u8 = 0;
pub(crate) const RESPONSE_KIND_STATUS: u8 = 1;

/// Command opcodes, in wire order.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, FromRepr, Display, IntoStaticStr, Serialize,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    GetStatus = 0,
    StartUpdate = 1,
    DataBlock = 2,
    FinishUpdate = 3,
    Reboot = 4,
    SetActiveBank = 5,
    WipeAll = 6,
}

impl Opcode {
    /// Returns the opcode byte.
    ///
    /// ```
    /// use crispy_upload::Opcode;
    ///
    /// assert_eq!(2, Opcode::DataBlock.as_raw());
    /// ```
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Returns which response shape the device answers this opcode with.
    ///
    /// ```
    /// use crispy_upload::{Opcode, ResponseKind};
    ///
    /// assert_eq!(ResponseKind::Status, Opcode::GetStatus.expected_response());
    /// assert_eq!(ResponseKind::Ack, Opcode::Reboot.expected_response());
    /// ```
    #[must_use]
    pub const fn expected_response(self) -> ResponseKind {
        match self {
            Self::GetStatus => ResponseKind::Status,
            Self::StartUpdate
            | Self::DataBlock
            | Self::FinishUpdate
            | Self::Reboot
            | Self::SetActiveBank
            | Self::WipeAll => ResponseKind::Ack,
        }
    }
}

/// The two response shapes a device can send.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Outcome code only.
    Ack,
    /// Device state snapshot.
    Status,
}
