use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig, FakeProbe};
use super::model::{
    CharacteristicHandle, DeviceSelection, FoundDevice, LinkState, ServiceHandle,
};
use crate::error::InteractionError;

/// Platform layer that picks a board to talk to.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Selects the first board matching `selection`.
    ///
    /// Fails with [`InteractionError::SelectionCancelled`] when nothing is picked.
    async fn select_device(
        &self,
        selection: &DeviceSelection,
    ) -> Result<Box<dyn BoardLink>, InteractionError>;
}

/// Connection handle to one selected board.
///
/// Every successful [`BoardLink::connect`] starts a new connection generation;
/// handles resolved on an earlier generation are rejected.
#[async_trait]
pub trait BoardLink: Send + Sync {
    /// Returns details for the selected device.
    fn device(&self) -> &FoundDevice;

    /// Subscribes to asynchronous connection-state changes.
    fn link_state(&self) -> watch::Receiver<LinkState>;

    async fn connect(&self) -> Result<(), InteractionError>;

    /// Discovers the services exposed by the connected board.
    async fn discover_services(&self) -> Result<(), InteractionError>;

    /// Resolves a discovered service.
    async fn resolve_service(&self, service: Uuid) -> Result<ServiceHandle, InteractionError>;

    /// Resolves a characteristic within a resolved service.
    async fn resolve_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, InteractionError>;

    /// Performs a fresh read of a characteristic.
    async fn read(&self, characteristic: &CharacteristicHandle)
    -> Result<Vec<u8>, InteractionError>;

    async fn disconnect(&self) -> Result<(), InteractionError>;
}

/// Builds a hardware client backed by the real BLE transport.
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(RealHardwareClient)
}

/// Builds a hardware client backed by fake fixtures.
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    fake_hardware_client_with_probe(config).0
}

/// Builds a fake hardware client plus a probe observing the links it hands out.
pub(crate) fn fake_hardware_client_with_probe(
    config: FakeBackendConfig,
) -> (Box<dyn HardwareClient>, FakeProbe) {
    info!("using fake BLE backend");
    let backend = FakeBackend::new(config);
    let probe = backend.probe();
    (Box::new(FakeHardwareClient { backend }), probe)
}

#[derive(Debug)]
struct RealHardwareClient;

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn select_device(
        &self,
        selection: &DeviceSelection,
    ) -> Result<Box<dyn BoardLink>, InteractionError> {
        let backend = BtleplugBackend::new().await?;
        let link = backend.select_first_matching(selection).await?;
        Ok(Box::new(link))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    backend: FakeBackend,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn select_device(
        &self,
        selection: &DeviceSelection,
    ) -> Result<Box<dyn BoardLink>, InteractionError> {
        let link = self.backend.select_first_matching(selection).await?;
        Ok(Box::new(link))
    }
}
