use std::time::Duration;

use crate::error::ChannelError;

/// Half-duplex byte transport to a bootloader.
///
/// Implementations block for at most the supplied timeout on each read and
/// report expiry as [`ChannelError::Timeout`].
pub trait ByteChannel: Send {
    /// Writes every byte of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the write fails.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Reads one byte, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] when no byte arrives in time.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ChannelError>;

    /// Pushes buffered writes out to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport rejects the flush.
    fn flush(&mut self) -> Result<(), ChannelError>;

    /// Releases the transport. Later operations fail with
    /// [`ChannelError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to shut down cleanly.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Human-readable channel name for logs and output.
    fn name(&self) -> String;
}
