use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::hardware::BoardLink;
use super::model::{
    CharacteristicHandle, DeviceSelection, FoundDevice, LinkState, ServiceHandle,
};
use crate::error::InteractionError;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new()
            .await
            .map_err(|source| InteractionError::BluetoothUnavailable { source })?;
        Ok(Self { manager })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    /// Scans until a matching board appears, the selection times out, or the user interrupts.
    #[instrument(skip(self), level = "debug", fields(prefix = selection.name_prefix()))]
    pub(crate) async fn select_first_matching(
        self,
        selection: &DeviceSelection,
    ) -> Result<RealBoardLink, InteractionError> {
        let adapters = self.adapters().await?;
        let filter = ScanFilter {
            services: vec![selection.service()],
        };
        info!(
            adapter_count = adapters.len(),
            timeout = %humantime::format_duration(selection.timeout()),
            "scanning for boards"
        );
        for adapter in &adapters {
            adapter.adapter.start_scan(filter.clone()).await?;
        }

        let selected = tokio::select! {
            _ = tokio::signal::ctrl_c() => Err(InteractionError::SelectionCancelled),
            found = timeout(selection.timeout(), find_first_matching(&adapters, selection)) => {
                found.unwrap_or(Err(InteractionError::SelectionCancelled))
            }
        };

        for handle in &adapters {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, "failed to stop adapter scan cleanly");
            }
        }

        let (adapter, peripheral, device) = selected?;
        info!(device = device.display_name(), "selected board");
        RealBoardLink::new(&adapter, peripheral, device).await
    }
}

async fn find_first_matching(
    adapters: &[AdapterHandle],
    selection: &DeviceSelection,
) -> Result<(Adapter, Peripheral, FoundDevice), InteractionError> {
    loop {
        for handle in adapters {
            for peripheral in handle.adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                let device =
                    found_device(&handle.name, peripheral.id().to_string(), &properties);
                if is_candidate(&properties, &device, selection) {
                    return Ok((handle.adapter.clone(), peripheral, device));
                }
            }
        }

        sleep(SCAN_POLL_INTERVAL).await;
    }
}

/// Cached and paired peripherals show up alongside scan results, so the advertised
/// service is checked here as well as in the scan filter.
fn is_candidate(
    properties: &PeripheralProperties,
    device: &FoundDevice,
    selection: &DeviceSelection,
) -> bool {
    properties.services.contains(&selection.service())
        && device.matches_name_prefix(selection.name_prefix())
}

fn found_device(
    adapter_name: &str,
    device_id: String,
    properties: &PeripheralProperties,
) -> FoundDevice {
    FoundDevice::new(
        adapter_name.to_string(),
        device_id,
        properties.local_name.clone(),
        properties.rssi,
    )
}

/// Link bound to a real peripheral.
///
/// A background task follows adapter events and publishes disconnects for
/// this peripheral on the link-state channel.
#[derive(Debug)]
pub(crate) struct RealBoardLink {
    device: FoundDevice,
    peripheral: Peripheral,
    generation: AtomicU64,
    link_state: Arc<watch::Sender<LinkState>>,
    monitor: JoinHandle<()>,
}

impl RealBoardLink {
    async fn new(
        adapter: &Adapter,
        peripheral: Peripheral,
        device: FoundDevice,
    ) -> Result<Self, InteractionError> {
        let (link_state, _) = watch::channel(LinkState::Disconnected);
        let link_state = Arc::new(link_state);
        let peripheral_id = peripheral.id();
        let events = adapter
            .events()
            .await?
            .filter_map(move |event| link_event(event, &peripheral_id));
        let monitor_state = Arc::clone(&link_state);
        let monitor_peripheral = peripheral.clone();

        let monitor = tokio::spawn(async move {
            follow_link_events(events, &monitor_state, move || {
                let peripheral = monitor_peripheral.clone();
                async move { peripheral.is_connected().await.unwrap_or(false) }
            })
            .await;
        });

        Ok(Self {
            device,
            peripheral,
            generation: AtomicU64::new(0),
            link_state,
            monitor,
        })
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, handle_generation: u64) -> Result<(), InteractionError> {
        let current_generation = self.current_generation();
        if handle_generation == current_generation {
            Ok(())
        } else {
            Err(InteractionError::StaleHandle {
                handle_generation,
                current_generation,
            })
        }
    }

    fn characteristic_for(&self, service: Uuid, characteristic: Uuid) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|candidate| candidate.service_uuid == service && candidate.uuid == characteristic)
    }
}

impl Drop for RealBoardLink {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

#[async_trait]
impl BoardLink for RealBoardLink {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link_state.subscribe()
    }

    #[instrument(skip(self), level = "debug")]
    async fn connect(&self) -> Result<(), InteractionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        self.link_state.send_replace(LinkState::Connected);
        debug!(generation, "connected to board");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn discover_services(&self) -> Result<(), InteractionError> {
        self.peripheral.discover_services().await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn resolve_service(&self, service: Uuid) -> Result<ServiceHandle, InteractionError> {
        self.peripheral
            .services()
            .iter()
            .find(|candidate| candidate.uuid == service)
            .map(|_| ServiceHandle::new(service, self.current_generation()))
            .ok_or(InteractionError::ServiceNotFound { service })
    }

    #[instrument(skip(self), level = "trace")]
    async fn resolve_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, InteractionError> {
        self.ensure_current(service.generation())?;
        self.characteristic_for(service.uuid(), characteristic)
            .map(|_| CharacteristicHandle::new(service, characteristic))
            .ok_or(InteractionError::CharacteristicNotFound {
                service: service.uuid(),
                characteristic,
            })
    }

    #[instrument(skip(self), level = "trace")]
    async fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<Vec<u8>, InteractionError> {
        self.ensure_current(characteristic.generation())?;
        let target = self
            .characteristic_for(characteristic.service(), characteristic.uuid())
            .ok_or(InteractionError::CharacteristicNotFound {
                service: characteristic.service(),
                characteristic: characteristic.uuid(),
            })?;
        Ok(self.peripheral.read(&target).await?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn disconnect(&self) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        self.link_state.send_replace(LinkState::Disconnected);
        Ok(())
    }
}

/// Adapter events concerning the selected peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum LinkEvent {
    Connected,
    Disconnected,
}

fn link_event(event: CentralEvent, peripheral_id: &PeripheralId) -> Option<LinkEvent> {
    match event {
        CentralEvent::DeviceConnected(id) if id == *peripheral_id => Some(LinkEvent::Connected),
        CentralEvent::DeviceDisconnected(id) if id == *peripheral_id => {
            Some(LinkEvent::Disconnected)
        }
        _ => None,
    }
}

/// Publishes link events on `link_state` until the event stream ends.
///
/// A disconnect event can arrive after the session has already torn the link down
/// and connected again; it is dropped while `is_connected` still reports a live link.
async fn follow_link_events<S, F, Fut>(
    events: S,
    link_state: &watch::Sender<LinkState>,
    is_connected: F,
) where
    S: Stream<Item = LinkEvent>,
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut events = std::pin::pin!(events);
    while let Some(event) = events.next().await {
        match event {
            LinkEvent::Connected => {
                link_state.send_replace(LinkState::Connected);
            }
            LinkEvent::Disconnected => {
                if is_connected().await {
                    debug!("ignoring disconnect event for a link that is connected again");
                } else {
                    warn!("board disconnected");
                    link_state.send_replace(LinkState::Disconnected);
                }
            }
        }
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}
