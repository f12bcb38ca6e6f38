use tracing::instrument;

use super::CommandError;
use super::command::send_expecting_ok;
use crate::codec::Command;
use crate::hw::DeviceSession;

/// Handler for device restarts.
pub struct RebootHandler;

impl RebootHandler {
    /// Asks the bootloader to restart. The device acknowledges before it
    /// resets, so the channel usually disappears right after this returns.
    ///
    /// # Errors
    ///
    /// Returns an error when the exchange fails or the device refuses.
    #[instrument(skip(session), level = "debug")]
    pub fn reboot(session: &mut DeviceSession) -> Result<(), CommandError> {
        send_expecting_ok(session, &Command::Reboot)
    }
}
