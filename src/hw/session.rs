use std::time::Duration;

use thiserror::Error;
use tracing::{Span, instrument};

use super::channel::ByteChannel;
use super::frame_reader::FrameReader;
use crate::codec::{
    AckStatus, Command, DeviceStatus, MessageError, Response, decode_response, encode_command,
};
use crate::error::ChannelError;
use crate::protocol::{DEFAULT_RESPONSE_TIMEOUT, MAX_RESPONSE_FRAME_LEN, ResponseKind};
use crate::utils::format_hex;

const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(10);
const MAX_STALE_DRAIN_BYTES: usize = 4096;

/// Errors returned by a single request/response exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("failed to decode response")]
    Decode(#[from] MessageError),
    #[error("expected {expected} response but received {actual}")]
    UnexpectedResponseKind {
        expected: ResponseKind,
        actual: ResponseKind,
    },
}

/// An open connection to one bootloader.
///
/// The session owns its channel, so only one exchange can be outstanding.
/// Dropping the session closes the channel.
pub struct DeviceSession {
    channel: Box<dyn ByteChannel>,
    reader: FrameReader,
    response_timeout: Duration,
    closed: bool,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("channel", &self.channel.name())
            .field("response_timeout", &self.response_timeout)
            .field("closed", &self.closed)
            .finish()
    }
}

impl DeviceSession {
    /// Wraps `channel` with the default response timeout.
    #[must_use]
    pub fn new(channel: Box<dyn ByteChannel>) -> Self {
        Self {
            channel,
            reader: FrameReader::new(MAX_RESPONSE_FRAME_LEN),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            closed: false,
        }
    }

    /// Overrides the deadline used by [`DeviceSession::exchange`].
    #[must_use]
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Returns the underlying channel name.
    #[must_use]
    pub fn channel_name(&self) -> String {
        self.channel.name()
    }

    /// Sends `command` and waits for one response using the session timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel fails, no response arrives in time,
    /// the response cannot be decoded, or its kind does not match the opcode.
    pub fn exchange(&mut self, command: &Command) -> Result<Response, ExchangeError> {
        self.exchange_with_timeout(command, self.response_timeout)
    }

    /// Sends `command` and waits at most `timeout` for one response.
    ///
    /// Stale bytes left over from an earlier abandoned exchange are drained
    /// before the command is written. The response must have the kind
    /// [`Opcode::expected_response`](crate::Opcode::expected_response) names
    /// for the command's opcode.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel fails, no response arrives in time,
    /// the response cannot be decoded, or its kind does not match the opcode.
    #[instrument(
        skip(self, command),
        level = "debug",
        fields(
            opcode = %command.opcode(),
            timeout_ms = timeout.as_millis(),
            response_kind = tracing::field::Empty
        )
    )]
    pub fn exchange_with_timeout(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Response, ExchangeError> {
        if self.closed {
            return Err(ChannelError::Closed.into());
        }
        self.drain_stale_input()?;

        let frame = encode_command(command);
        tracing::trace!(frame_len = frame.len(), "sending command frame");
        self.channel.write_all(frame.as_bytes())?;
        self.channel.flush()?;

        let raw = self.reader.read_frame(self.channel.as_mut(), timeout)?;
        tracing::trace!(frame = %format_hex(&raw), "received response frame");
        let response = decode_response(&raw)?;
        Span::current().record("response_kind", tracing::field::display(response.kind()));

        let expected = command.opcode().expected_response();
        if response.kind() != expected {
            return Err(ExchangeError::UnexpectedResponseKind {
                expected,
                actual: response.kind(),
            });
        }
        Ok(response)
    }

    /// Sends `command` and returns the Ack status it is answered with.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnexpectedResponseKind`] when the device
    /// answers with a Status response, plus any exchange error.
    pub fn expect_ack(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<AckStatus, ExchangeError> {
        match self.exchange_with_timeout(command, timeout)? {
            Response::Ack { status } => Ok(status),
            other => Err(ExchangeError::UnexpectedResponseKind {
                expected: ResponseKind::Ack,
                actual: other.kind(),
            }),
        }
    }

    /// Sends `GetStatus` and returns the status snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnexpectedResponseKind`] when the device
    /// answers with an Ack, plus any exchange error.
    pub fn expect_status(&mut self) -> Result<DeviceStatus, ExchangeError> {
        match self.exchange(&Command::GetStatus)? {
            Response::Status(status) => Ok(status),
            other => Err(ExchangeError::UnexpectedResponseKind {
                expected: ResponseKind::Status,
                actual: other.kind(),
            }),
        }
    }

    /// Closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to shut down cleanly.
    pub fn close(mut self) -> Result<(), ChannelError> {
        self.closed = true;
        self.channel.close()
    }

    #[instrument(skip(self), level = "trace", fields(drained_bytes = tracing::field::Empty))]
    fn drain_stale_input(&mut self) -> Result<(), ChannelError> {
        let mut drained_bytes = 0usize;
        while drained_bytes < MAX_STALE_DRAIN_BYTES {
            match self.channel.read_byte(DRAIN_READ_TIMEOUT) {
                Ok(_stale) => drained_bytes += 1,
                Err(ChannelError::Timeout { .. }) => break,
                Err(error) => return Err(error),
            }
        }

        if drained_bytes > 0 {
            Span::current().record("drained_bytes", drained_bytes);
            tracing::debug!(drained_bytes, "discarded stale input before exchange");
        }
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.channel.close() {
            tracing::trace!(?error, "failed to close channel cleanly on drop");
        }
    }
}
