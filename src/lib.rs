//! Host-side firmware upload for the crispy bootloader.
//!
//! Commands travel as COBS-stuffed, zero-delimited frames over a byte
//! channel (USB CDC serial in practice). The [`UploadHandler`] drives the
//! StartUpdate, DataBlock and FinishUpdate sequence; the remaining handlers
//! cover one-shot commands.

mod app;
mod cli;
pub mod codec;
mod error;
mod handlers;
mod hw;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{fake_hardware_client, run, run_with_clients};
pub use cli::{
    Args, CliCommand, FakeArgs, LogLevel, OutputFormat, RunOptions, SetBankArgs, UploadArgs,
};
pub use codec::{
    AckStatus, BootState, Command, DeviceStatus, Frame, MessageError, Response, decode_command,
    decode_response, encode_command, encode_response,
};
pub use error::{ChannelError, FixtureError};
pub use handlers::{
    BankHandler, CommandError, RebootHandler, StatusHandler, UploadError, UploadHandler,
    UploadReceipt, UploadRequest, UploadSession, UploadState, UploadStep, WipeHandler,
};
pub use hw::{
    ByteChannel, DeviceSession, ExchangeError, FakeBackendConfig, FakeChannel, FakeDeviceConfig,
    FakeDeviceHandle, HardwareClient, HexFrame, ScriptedChannel, ScriptedResponses, SerialChannel,
    SimulatedDevice, WriteLog, channel_hardware_client, real_hardware_client,
};
pub use protocol::{
    BANK_COUNT, DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_START_UPDATE_TIMEOUT,
    FIRMWARE_BANK_SIZE, FRAME_DELIMITER, MAX_DATA_BLOCK_SIZE, MAX_RESPONSE_FRAME_LEN, Opcode,
    ResponseKind,
};
pub use terminal::TerminalClient;
