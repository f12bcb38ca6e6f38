pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod status;
pub(crate) mod ui;
pub(crate) mod upload;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::hw::{DeviceSession, HardwareClient};

pub use self::command::{
    Args, CliCommand, FakeArgs, LogLevel, OutputFormat, RunOptions, SetBankArgs, UploadArgs,
};

/// Opens a session, runs `operation` on it, then closes it.
///
/// A close failure is reported only when the operation itself succeeded.
pub(crate) fn with_session<T, F>(
    client: Box<dyn HardwareClient>,
    response_timeout: Duration,
    operation: F,
) -> Result<T>
where
    F: FnOnce(&mut DeviceSession) -> Result<T>,
{
    let mut session = client
        .open_session(response_timeout)
        .context("failed to open the device channel")?;
    let channel_name = session.channel_name();

    let result = operation(&mut session);
    let close_result = session.close();

    if let Err(error) = close_result {
        if result.is_ok() {
            return Err(error)
                .with_context(|| format!("failed to close the device channel `{channel_name}`"));
        }
        tracing::trace!(?error, %channel_name, "failed to close session cleanly");
    }

    result
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
