use thiserror::Error;

/// Errors returned by byte channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no complete response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("the channel is closed")]
    Closed,
    #[error("received {max_len} bytes without a frame delimiter")]
    FrameTooLong { max_len: usize },
    #[error("channel I/O failed")]
    Io(#[from] std::io::Error),
    #[error("serial port operation failed")]
    Serial(#[from] serialport::Error),
}

impl ChannelError {
    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Self::Timeout { timeout_ms }
    }
}

/// Errors returned when parsing fake device fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the scripted response fixture is empty")]
    EmptyFixture,
    #[error("fixture frame `{value}` is not valid hex")]
    InvalidHex {
        value: String,
        source: hex::FromHexError,
    },
    #[error("fixture frames cannot be empty")]
    EmptyFrame,
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("either --port or --fake must be given")]
    MissingPort,
    #[error("--port cannot be combined with --fake")]
    PortWithFake,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

