use std::io;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::cli::{OutputFormat, RunOptions, with_session, write_json_line};
use crate::handlers::StatusHandler;
use crate::hw::HardwareClient;
use crate::terminal::TerminalClient;

use super::ui::{Painter, StatusView};

/// Executes the `status` command.
#[instrument(skip(client, out, terminal_client), level = "info", fields(?options))]
pub(crate) fn run<W>(
    client: Box<dyn HardwareClient>,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let status = with_session(client, options.response_timeout(), |session| {
        StatusHandler::get_status(session).context("failed to read bootloader status")
    })?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", StatusView::new(&status, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &status)?,
    }

    Ok(())
}
