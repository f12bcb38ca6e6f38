use std::io;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::instrument;

use crate::cli::{OutputFormat, RunOptions, with_session, write_json_line};
use crate::handlers::{BankHandler, RebootHandler, WipeHandler};
use crate::hw::HardwareClient;
use crate::terminal::TerminalClient;
use crate::utils::bank_label;

use super::ui::Painter;

/// One-shot device action without a payload of its own.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum ControlAction {
    SetBank { bank: u8 },
    Wipe,
    Reboot,
}

/// Executes `set-bank`, `wipe` or `reboot`.
#[instrument(skip(client, out, terminal_client), level = "info", fields(?action))]
pub(crate) fn run<W>(
    client: Box<dyn HardwareClient>,
    action: ControlAction,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    with_session(client, options.response_timeout(), |session| match action {
        ControlAction::SetBank { bank } => BankHandler::set_active_bank(session, bank)
            .with_context(|| format!("failed to set the active bank to {bank}")),
        ControlAction::Wipe => {
            WipeHandler::wipe_all(session).context("failed to wipe the firmware banks")
        }
        ControlAction::Reboot => RebootHandler::reboot(session).context("failed to reboot"),
    })?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            write_pretty(out, action, &painter)?;
        }
        OutputFormat::Json => write_json_line(out, &action)?,
    }

    Ok(())
}

fn write_pretty(out: &mut impl io::Write, action: ControlAction, painter: &Painter) -> Result<()> {
    let tick = painter.success("✓");
    match action {
        ControlAction::SetBank { bank } => {
            writeln!(
                out,
                "{tick} Active bank set to {}",
                painter.value(format!("{bank} ({})", bank_label(bank)))
            )?;
            writeln!(out, "{}", painter.muted("Reboot the device to apply."))?;
        }
        ControlAction::Wipe => {
            writeln!(out, "{tick} Boot data reset; both banks are invalid")?;
            writeln!(
                out,
                "{}",
                painter.muted("The device stays in update mode until new firmware is uploaded.")
            )?;
        }
        ControlAction::Reboot => writeln!(out, "{tick} Device is rebooting")?,
    }
    Ok(())
}
