mod channel;
mod fake_backend;
mod frame_reader;
mod hardware;
mod serial_backend;
mod session;

pub use self::channel::ByteChannel;
pub use self::fake_backend::{
    FakeChannel, FakeDeviceConfig, FakeDeviceHandle, HexFrame, ScriptedChannel, ScriptedResponses,
    SimulatedDevice, WriteLog,
};
pub use self::hardware::{
    FakeBackendConfig, HardwareClient, channel_hardware_client, fake_hardware_client,
    real_hardware_client,
};
pub(crate) use self::hardware::{HardwareBackend, hardware_client_from_backend};
pub use self::serial_backend::SerialChannel;
pub use self::session::{DeviceSession, ExchangeError};
