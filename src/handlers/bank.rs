use tracing::instrument;

use super::CommandError;
use super::command::send_expecting_ok;
use crate::codec::Command;
use crate::hw::DeviceSession;

/// Handler for switching the boot bank.
pub struct BankHandler;

impl BankHandler {
    /// Marks `bank` as the one to boot next.
    ///
    /// The device refuses banks without a verified image.
    ///
    /// ```
    /// use crispy_upload::{BankHandler, DeviceSession, FakeChannel, FakeDeviceConfig};
    ///
    /// let config = FakeDeviceConfig::builder().version_b(2).build();
    /// let mut session = DeviceSession::new(Box::new(FakeChannel::new(&config)));
    /// BankHandler::set_active_bank(&mut session, 1)?;
    /// # Ok::<(), crispy_upload::CommandError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Rejected`] when the device answers with any
    /// status other than `Ok`, plus any exchange error.
    #[instrument(skip(session), level = "debug")]
    pub fn set_active_bank(session: &mut DeviceSession, bank: u8) -> Result<(), CommandError> {
        send_expecting_ok(session, &Command::SetActiveBank { bank })
    }
}
