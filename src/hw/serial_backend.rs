use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::instrument;

use super::channel::ByteChannel;
use crate::error::ChannelError;
use crate::protocol::DEFAULT_RESPONSE_TIMEOUT;

/// Pause after opening so the CDC interface settles before the first write.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Byte channel over a serial port such as the bootloader's USB CDC device.
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port_name", &self.port_name)
            .field("open", &self.port.is_some())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SerialChannel {
    /// Opens `port_name` at `baud_rate` and discards anything already
    /// buffered on the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened or cleared.
    #[instrument(level = "debug")]
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, ChannelError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(DEFAULT_RESPONSE_TIMEOUT)
            .open()?;
        thread::sleep(SETTLE_DELAY);
        port.clear(ClearBuffer::Input)?;
        tracing::debug!(port_name, baud_rate, "opened serial channel");

        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            read_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ChannelError> {
        self.port.as_mut().ok_or(ChannelError::Closed)
    }
}

impl ByteChannel for SerialChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.port_mut()?.write_all(bytes)?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ChannelError> {
        if self.read_timeout != timeout {
            self.port_mut()?.set_timeout(timeout)?;
            self.read_timeout = timeout;
        }

        let mut byte = [0u8; 1];
        match self.port_mut()?.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(ChannelError::timeout(timeout)),
            Err(error) if error.kind() == ErrorKind::TimedOut => {
                Err(ChannelError::timeout(timeout))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        self.port_mut()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        if self.port.take().is_some() {
            tracing::debug!(port_name = %self.port_name, "closed serial channel");
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}
