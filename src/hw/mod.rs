mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;

pub(crate) use self::fake_backend::{FakeBackendConfig, ScanFixture};
pub use self::fake_backend::FakeTransportProbe;
pub use self::hardware::{DeviceSession, HardwareClient};
pub(crate) use self::hardware::{fake_hardware_client, real_hardware_client};
pub use self::model::{CharacteristicWrite, DiscoveredDevice};
