use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    FakeBackendConfig, FakeDeviceConfig, HardwareBackend, HardwareClient, ScriptedResponses,
    hardware_client_from_backend,
};
use crate::protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_START_UPDATE_TIMEOUT, MAX_DATA_BLOCK_SIZE,
};

/// Command-line options for the crispy bootloader upload tool.
#[derive(Debug, Parser)]
#[command(
    name = "crispy-upload",
    about = "Upload firmware to a crispy bootloader over serial."
)]
pub struct Args {
    /// Serial port of the bootloader (e.g. `/dev/ttyACM0`).
    #[arg(short, long, global = true)]
    port: Option<String>,
    /// Serial baud rate.
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Deadline for each device response (e.g. `500ms`, `5s`).
    #[arg(long, global = true, value_parser = parse_duration, default_value = "5s")]
    timeout: Duration,
    /// Log level; overrides `RUST_LOG` when given.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Talks to an in-process simulated bootloader instead of a serial port.
    #[arg(long, global = true, conflicts_with = "port")]
    fake: bool,
    /// Bank the simulated bootloader reports as active.
    #[arg(long, global = true, requires = "fake")]
    fake_active_bank: Option<u8>,
    /// Preloads simulated bank A with an image of this version.
    #[arg(long, global = true, requires = "fake")]
    fake_version_a: Option<u32>,
    /// Preloads simulated bank B with an image of this version.
    #[arg(long, global = true, requires = "fake")]
    fake_version_b: Option<u32>,
    /// Simulated bootloader stops answering after this many commands.
    #[arg(long, global = true, requires = "fake")]
    fake_silent_after: Option<usize>,
    /// Simulated bootloader fails to program the block covering this offset.
    #[arg(long, global = true, requires = "fake")]
    fake_flash_error_at: Option<u32>,
    /// Simulated bootloader corrupts the stored byte at this offset.
    #[arg(long, global = true, requires = "fake")]
    fake_corrupt_byte_at: Option<u32>,
    /// Replays `;`-separated hex response frames instead of simulating a bootloader.
    #[arg(long, global = true, requires = "fake")]
    fake_responses: Option<ScriptedResponses>,
    #[command(subcommand)]
    command: CliCommand,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use crispy_upload::{Args, CliCommand, SetBankArgs};
    ///
    /// let status = Args::new(CliCommand::Status).with_port("/dev/ttyACM0");
    /// let set_bank = Args::new(CliCommand::SetBank(SetBankArgs::new(1)));
    /// let _ = (status, set_bank);
    /// ```
    #[must_use]
    pub fn new(command: CliCommand) -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            log_level: None,
            output: None,
            fake: false,
            fake_active_bank: None,
            fake_version_a: None,
            fake_version_b: None,
            fake_silent_after: None,
            fake_flash_error_at: None,
            fake_corrupt_byte_at: None,
            fake_responses: None,
            command,
        }
    }

    /// Selects the serial port to open.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Overrides the per-response deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            active_bank,
            version_a,
            version_b,
            silent_after,
            flash_error_at,
            corrupt_byte_at,
            responses,
        } = fake;

        self.fake = true;
        self.fake_active_bank = active_bank;
        self.fake_version_a = version_a;
        self.fake_version_b = version_b;
        self.fake_silent_after = silent_after;
        self.fake_flash_error_at = flash_error_at;
        self.fake_corrupt_byte_at = corrupt_byte_at;
        self.fake_responses = responses;
        self
    }

    /// Returns the requested log level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format, if one was given.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Returns the per-response deadline.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves the settings `run` needs, falling back to `pretty` output on a
    /// terminal and `json` elsewhere.
    #[must_use]
    pub fn run_options(&self, stdout_is_terminal: bool) -> RunOptions {
        let default_format = if stdout_is_terminal {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        };
        RunOptions::builder()
            .output_format(self.output.unwrap_or(default_format))
            .response_timeout(self.timeout)
            .maybe_log_level(self.log_level)
            .build()
    }

    /// Splits parsed CLI arguments into the command and a hardware client for
    /// the selected backend.
    ///
    /// # Errors
    ///
    /// Returns an error if neither or both of a port and fake mode are selected.
    pub fn into_command_and_client(
        self,
    ) -> anyhow::Result<(CliCommand, Box<dyn HardwareClient>)> {
        let (command, backend) = self.into_command_and_backend()?;
        Ok((command, hardware_client_from_backend(backend)))
    }

    pub(crate) fn into_command_and_backend(
        self,
    ) -> Result<(CliCommand, HardwareBackend), CliConfigError> {
        let Args {
            port,
            baud,
            fake,
            fake_active_bank,
            fake_version_a,
            fake_version_b,
            fake_silent_after,
            fake_flash_error_at,
            fake_corrupt_byte_at,
            fake_responses,
            command,
            ..
        } = self;

        let backend = match (port, fake) {
            (Some(_port), true) => return Err(CliConfigError::PortWithFake),
            (None, false) => return Err(CliConfigError::MissingPort),
            (Some(port_name), false) => HardwareBackend::Serial {
                port_name,
                baud_rate: baud,
            },
            (None, true) => HardwareBackend::Fake(
                FakeArgs {
                    active_bank: fake_active_bank,
                    version_a: fake_version_a,
                    version_b: fake_version_b,
                    silent_after: fake_silent_after,
                    flash_error_at: fake_flash_error_at,
                    corrupt_byte_at: fake_corrupt_byte_at,
                    responses: fake_responses,
                }
                .into_backend_config(),
            ),
        };

        Ok((command, backend))
    }
}

/// Fake backend arguments for programmatic runs.
///
/// ```
/// use crispy_upload::FakeArgs;
///
/// let fake = FakeArgs::builder().version_a(3).flash_error_at(2048).build();
/// let scripted = FakeArgs::builder().responses("01 01 01 00")?.build();
/// let _ = (fake, scripted);
/// # Ok::<(), crispy_upload::FixtureError>(())
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct FakeArgs {
    active_bank: Option<u8>,
    version_a: Option<u32>,
    version_b: Option<u32>,
    silent_after: Option<usize>,
    flash_error_at: Option<u32>,
    corrupt_byte_at: Option<u32>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    responses: Option<ScriptedResponses>,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            active_bank,
            version_a,
            version_b,
            silent_after,
            flash_error_at,
            corrupt_byte_at,
            responses,
        } = self;

        if let Some(responses) = responses {
            return FakeBackendConfig::Scripted(responses);
        }

        FakeBackendConfig::Simulated(
            FakeDeviceConfig::builder()
                .maybe_active_bank(active_bank)
                .maybe_version_a(version_a)
                .maybe_version_b(version_b)
                .maybe_silent_after(silent_after)
                .maybe_flash_error_at(flash_error_at)
                .maybe_corrupt_byte_at(corrupt_byte_at)
                .build(),
        )
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the active bank, both bank versions and the bootloader state.
    Status,
    /// Upload a firmware image to a bank and make it active.
    Upload(UploadArgs),
    /// Select the bank to boot next without uploading new firmware.
    SetBank(SetBankArgs),
    /// Wipe both firmware banks and reset boot data.
    Wipe,
    /// Reboot the device.
    Reboot,
}

impl CliCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Upload(_args) => "upload",
            Self::SetBank(_args) => "set-bank",
            Self::Wipe => "wipe",
            Self::Reboot => "reboot",
        }
    }
}

/// Arguments for `upload`.
#[derive(Debug, clap::Args)]
pub struct UploadArgs {
    /// Firmware binary file.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Target bank (0 = A, 1 = B).
    #[arg(short, long, default_value_t = 0)]
    bank: u8,
    /// Firmware version number recorded with the image.
    #[arg(short, long, default_value_t = 1)]
    version: u32,
    /// Bytes sent per data block.
    #[arg(long, default_value_t = MAX_DATA_BLOCK_SIZE)]
    chunk_size: usize,
    /// Deadline for the start acknowledgement, which covers the bank erase.
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    start_timeout: Duration,
}

impl UploadArgs {
    /// Creates upload arguments for bank A, version 1.
    ///
    /// ```
    /// use std::path::Path;
    ///
    /// use crispy_upload::UploadArgs;
    ///
    /// let args = UploadArgs::new("app.bin").with_bank(1).with_version(7);
    /// assert_eq!(Path::new("app.bin"), args.path());
    /// assert_eq!(1, args.bank());
    /// ```
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            bank: 0,
            version: 1,
            chunk_size: MAX_DATA_BLOCK_SIZE,
            start_timeout: DEFAULT_START_UPDATE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_bank(mut self, bank: u8) -> Self {
        self.bank = bank;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    /// Returns the firmware file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }
}

/// Arguments for `set-bank`.
#[derive(Debug, clap::Args)]
pub struct SetBankArgs {
    /// Target bank (0 = A, 1 = B).
    #[arg(value_name = "BANK")]
    bank: u8,
}

impl SetBankArgs {
    #[must_use]
    pub fn new(bank: u8) -> Self {
        Self { bank }
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }
}

/// Log level accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Returns the matching tracing filter.
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    Pretty,
    /// Pretty-printed JSON documents.
    Json,
}

/// Settings for one `run` call.
///
/// ```
/// use std::time::Duration;
///
/// use crispy_upload::{OutputFormat, RunOptions};
///
/// let options = RunOptions::builder()
///     .output_format(OutputFormat::Json)
///     .response_timeout(Duration::from_millis(200))
///     .build();
/// assert_eq!(OutputFormat::Json, options.output_format());
/// ```
#[derive(Debug, Clone, Copy, Builder)]
pub struct RunOptions {
    #[builder(default = OutputFormat::Pretty)]
    output_format: OutputFormat,
    #[builder(default = DEFAULT_RESPONSE_TIMEOUT)]
    response_timeout: Duration,
    log_level: Option<LogLevel>,
}

impl RunOptions {
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
