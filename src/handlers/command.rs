use thiserror::Error;

use crate::codec::{AckStatus, Command};
use crate::hw::{DeviceSession, ExchangeError};
use crate::protocol::Opcode;

/// Errors returned by one-shot bootloader commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("device rejected {opcode} with status {status}")]
    Rejected { opcode: Opcode, status: AckStatus },
    #[error("{opcode} exchange failed")]
    Exchange {
        opcode: Opcode,
        #[source]
        source: ExchangeError,
    },
}

/// Sends `command` and requires an `Ack(Ok)` answer.
pub(super) fn send_expecting_ok(
    session: &mut DeviceSession,
    command: &Command,
) -> Result<(), CommandError> {
    let opcode = command.opcode();
    let timeout = session.response_timeout();
    let status = session
        .expect_ack(command, timeout)
        .map_err(|source| CommandError::Exchange { opcode, source })?;
    if !status.is_ok() {
        return Err(CommandError::Rejected { opcode, status });
    }
    Ok(())
}
