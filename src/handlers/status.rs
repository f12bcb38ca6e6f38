use tracing::instrument;

use super::CommandError;
use crate::codec::DeviceStatus;
use crate::hw::DeviceSession;
use crate::protocol::Opcode;

/// Handler for bootloader status queries.
pub struct StatusHandler;

impl StatusHandler {
    /// Reads the active bank, both bank versions and the bootloader state.
    ///
    /// ```
    /// use crispy_upload::{
    ///     BootState, DeviceSession, FakeChannel, FakeDeviceConfig, StatusHandler,
    /// };
    ///
    /// let config = FakeDeviceConfig::builder().version_a(7).build();
    /// let mut session = DeviceSession::new(Box::new(FakeChannel::new(&config)));
    /// let status = StatusHandler::get_status(&mut session)?;
    /// assert_eq!(7, status.version_a());
    /// assert_eq!(BootState::UpdateMode, status.state());
    /// # Ok::<(), crispy_upload::CommandError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the exchange fails or the device answers with an
    /// Ack instead of a Status response.
    #[instrument(skip(session), level = "debug")]
    pub fn get_status(session: &mut DeviceSession) -> Result<DeviceStatus, CommandError> {
        session
            .expect_status()
            .map_err(|source| CommandError::Exchange {
                opcode: Opcode::GetStatus,
                source,
            })
    }
}
