use std::time::Duration;

use tracing::info;

use super::channel::ByteChannel;
use super::fake_backend::{FakeChannel, FakeDeviceConfig, ScriptedChannel, ScriptedResponses};
use super::serial_backend::SerialChannel;
use super::session::DeviceSession;
use crate::error::ChannelError;

/// Runtime backend selection.
#[derive(Debug, Clone)]
pub(crate) enum HardwareBackend {
    Serial { port_name: String, baud_rate: u32 },
    Fake(FakeBackendConfig),
}

/// What a fake backend talks to.
#[derive(Debug, Clone)]
pub enum FakeBackendConfig {
    /// A simulated bootloader.
    Simulated(FakeDeviceConfig),
    /// Canned response frames.
    Scripted(ScriptedResponses),
}

/// Builds an injected hardware client for the selected runtime backend.
pub(crate) fn hardware_client_from_backend(backend: HardwareBackend) -> Box<dyn HardwareClient> {
    match backend {
        HardwareBackend::Serial {
            port_name,
            baud_rate,
        } => real_hardware_client(port_name, baud_rate),
        HardwareBackend::Fake(config) => fake_hardware_client(config),
    }
}

/// Opens device sessions for the app layer.
pub trait HardwareClient: Send {
    /// Connects and returns a session using `response_timeout` per exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying channel cannot be opened.
    fn open_session(
        self: Box<Self>,
        response_timeout: Duration,
    ) -> Result<DeviceSession, ChannelError>;
}

/// Returns a client that opens `port_name` at `baud_rate`.
#[must_use]
pub fn real_hardware_client(port_name: String, baud_rate: u32) -> Box<dyn HardwareClient> {
    Box::new(RealHardwareClient {
        port_name,
        baud_rate,
    })
}

/// Returns a client backed by an in-process fake.
#[must_use]
pub fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    Box::new(FakeHardwareClient { config })
}

/// Returns a client that hands out an already-built channel.
///
/// Tests use this to keep a handle on the fake while the app drives it.
#[must_use]
pub fn channel_hardware_client(channel: Box<dyn ByteChannel>) -> Box<dyn HardwareClient> {
    Box::new(ChannelHardwareClient { channel })
}

#[derive(Debug)]
struct RealHardwareClient {
    port_name: String,
    baud_rate: u32,
}

impl HardwareClient for RealHardwareClient {
    fn open_session(
        self: Box<Self>,
        response_timeout: Duration,
    ) -> Result<DeviceSession, ChannelError> {
        let channel = SerialChannel::open(&self.port_name, self.baud_rate)?;
        Ok(DeviceSession::new(Box::new(channel)).with_response_timeout(response_timeout))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    config: FakeBackendConfig,
}

impl HardwareClient for FakeHardwareClient {
    fn open_session(
        self: Box<Self>,
        response_timeout: Duration,
    ) -> Result<DeviceSession, ChannelError> {
        let channel: Box<dyn ByteChannel> = match self.config {
            FakeBackendConfig::Simulated(config) => {
                info!("using simulated bootloader backend");
                Box::new(FakeChannel::new(&config))
            }
            FakeBackendConfig::Scripted(responses) => {
                info!(
                    scripted_responses = responses.len(),
                    "using scripted response backend"
                );
                Box::new(ScriptedChannel::new(responses))
            }
        };
        Ok(DeviceSession::new(channel).with_response_timeout(response_timeout))
    }
}

struct ChannelHardwareClient {
    channel: Box<dyn ByteChannel>,
}

impl HardwareClient for ChannelHardwareClient {
    fn open_session(
        self: Box<Self>,
        response_timeout: Duration,
    ) -> Result<DeviceSession, ChannelError> {
        Ok(DeviceSession::new(self.channel).with_response_timeout(response_timeout))
    }
}
