use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::control::ControlAction;
use crate::cli::{CliCommand, FakeArgs, LogLevel, RunOptions};
use crate::hw::{HardwareClient, fake_hardware_client as build_fake_hardware_client};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

const SERVICE_NAME: &str = "crispy-upload";

/// Creates a hardware client backed by an in-process fake bootloader.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Runs the CLI command against the process's real terminal.
///
/// ```
/// use clap::Parser;
///
/// let args = crispy_upload::Args::try_parse_from([
///     "crispy-upload",
///     "--fake",
///     "--fake-version-a",
///     "3",
///     "--output",
///     "json",
///     "status",
/// ])?;
/// let options = args.run_options(false);
/// let (command, hardware_client) = args.into_command_and_client()?;
/// let mut out = Vec::new();
/// crispy_upload::run(command, &mut out, hardware_client, options)?;
/// assert!(String::from_utf8(out)?.contains("\"version_a\": 3"));
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device exchange
/// fails, or output writing fails.
pub fn run<W>(
    command: CliCommand,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(command, out, &SystemTerminalClient, hardware_client, options)
}

/// Runs the CLI command with injected clients.
///
/// ```
/// use crispy_upload::{Args, CliCommand, FakeArgs, OutputFormat, RunOptions};
///
/// struct FakeTerminal;
/// impl crispy_upload::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = Args::new(CliCommand::Reboot).with_fake(FakeArgs::default());
/// let (command, hardware_client) = args.into_command_and_client()?;
/// let options = RunOptions::builder().output_format(OutputFormat::Json).build();
/// let mut out = Vec::new();
/// crispy_upload::run_with_clients(command, &mut out, &FakeTerminal, hardware_client, options)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device exchange
/// fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client),
    level = "info",
    fields(command = command.name(), output_format = ?options.output_format())
)]
pub fn run_with_clients<W>(
    command: CliCommand,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        SERVICE_NAME,
        terminal_client.stderr_is_terminal(),
        options.log_level().map(LogLevel::as_level_filter),
    )?;

    match command {
        CliCommand::Status => {
            crate::cli::status::run(hardware_client, out, terminal_client, options)
        }
        CliCommand::Upload(args) => {
            crate::cli::upload::run(hardware_client, &args, out, terminal_client, options)
        }
        CliCommand::SetBank(args) => crate::cli::control::run(
            hardware_client,
            ControlAction::SetBank { bank: args.bank() },
            out,
            terminal_client,
            options,
        ),
        CliCommand::Wipe => crate::cli::control::run(
            hardware_client,
            ControlAction::Wipe,
            out,
            terminal_client,
            options,
        ),
        CliCommand::Reboot => crate::cli::control::run(
            hardware_client,
            ControlAction::Reboot,
            out,
            terminal_client,
            options,
        ),
    }
}
