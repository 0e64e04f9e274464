mod btleplug_backend;
mod cache;
mod fake_backend;
mod hardware;
mod model;

pub use self::cache::AttributeCache;
pub(crate) use self::fake_backend::FakeBackendConfig;
pub use self::fake_backend::{AttributePayload, FakeFault, FakeProbe, ScanFixture};
pub use self::hardware::{BoardLink, HardwareClient};
pub(crate) use self::hardware::{
    fake_hardware_client, fake_hardware_client_with_probe, real_hardware_client,
};
pub(crate) use self::model::DEFAULT_SELECTION_TIMEOUT;
pub use self::model::{
    CharacteristicHandle, DeviceSelection, FoundDevice, LinkState, ServiceHandle,
};
