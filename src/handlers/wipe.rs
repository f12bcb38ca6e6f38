use tracing::instrument;

use super::CommandError;
use super::command::send_expecting_ok;
use crate::codec::Command;
use crate::hw::DeviceSession;

/// Handler for resetting the boot record.
pub struct WipeHandler;

impl WipeHandler {
    /// Clears both bank records and selects bank A. Only accepted while no
    /// update is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Rejected`] with `BadState` while receiving,
    /// plus any exchange error.
    #[instrument(skip(session), level = "debug")]
    pub fn wipe_all(session: &mut DeviceSession) -> Result<(), CommandError> {
        send_expecting_ok(session, &Command::WipeAll)
    }
}
