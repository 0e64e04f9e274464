use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::hardware::BoardLink;
use super::model::{
    CharacteristicHandle, DeviceSelection, FoundDevice, LinkState, ServiceHandle,
};
use crate::board::ProfileKind;
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{AttributeAddress, AttributeId, ServiceId, attribute_for_address};

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// A payload override for one attribute, written as `attribute=hex`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AttributePayload {
    attribute: AttributeId,
    payload: Vec<u8>,
}

impl FromStr for AttributePayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, raw_payload) =
            value
                .split_once('=')
                .ok_or_else(|| FixtureError::InvalidAttributePayload {
                    value: value.to_string(),
                })?;
        let name = name.trim();
        let attribute = name
            .parse::<AttributeId>()
            .map_err(|_| FixtureError::UnknownAttribute {
                name: name.to_string(),
            })?;
        Ok(Self {
            attribute,
            payload: parse_hex(raw_payload)?,
        })
    }
}

/// A scripted failure injected on one connection attempt.
///
/// Attempts are numbered from 1 by counting `connect` calls on a link.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FakeFault {
    /// The connect call fails.
    Connect { attempt: u64 },
    /// Service discovery fails.
    Discover { attempt: u64 },
    /// Reading the attribute fails with a transport error.
    Read { attribute: AttributeId, attempt: u64 },
    /// The board drops the link while the attribute is being read.
    Disconnect { attribute: AttributeId, attempt: u64 },
    /// The read of the attribute never completes.
    Stall { attribute: AttributeId, attempt: u64 },
}

impl FakeFault {
    fn attempt(self) -> u64 {
        match self {
            Self::Connect { attempt }
            | Self::Discover { attempt }
            | Self::Read { attempt, .. }
            | Self::Disconnect { attempt, .. }
            | Self::Stall { attempt, .. } => attempt,
        }
    }

    fn attribute(self) -> Option<AttributeId> {
        match self {
            Self::Connect { .. } | Self::Discover { .. } => None,
            Self::Read { attribute, .. }
            | Self::Disconnect { attribute, .. }
            | Self::Stall { attribute, .. } => Some(attribute),
        }
    }
}

impl Display for FakeFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let attempt = self.attempt();
        match self {
            Self::Connect { .. } => write!(f, "connect@{attempt}"),
            Self::Discover { .. } => write!(f, "discover@{attempt}"),
            Self::Read { attribute, .. } => write!(f, "read:{attribute}@{attempt}"),
            Self::Disconnect { attribute, .. } => write!(f, "disconnect:{attribute}@{attempt}"),
            Self::Stall { attribute, .. } => write!(f, "stall:{attribute}@{attempt}"),
        }
    }
}

impl FromStr for FakeFault {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FixtureError::InvalidFault {
            value: value.to_string(),
        };
        let (kind, attempt) = value.trim().rsplit_once('@').ok_or_else(invalid)?;
        let attempt: u64 = attempt.parse().map_err(|_| invalid())?;
        if attempt == 0 {
            return Err(invalid());
        }

        let fault = match kind.split_once(':') {
            None if kind == "connect" => Self::Connect { attempt },
            None if kind == "discover" => Self::Discover { attempt },
            Some((kind, attribute)) => {
                let attribute: AttributeId = attribute.parse().map_err(|_| invalid())?;
                match kind {
                    "read" => Self::Read { attribute, attempt },
                    "disconnect" => Self::Disconnect { attribute, attempt },
                    "stall" => Self::Stall { attribute, attempt },
                    _ => return Err(invalid()),
                }
            }
            None => return Err(invalid()),
        };
        Ok(fault)
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    /// Preset payload table the fake board answers with.
    #[builder(default)]
    board: ProfileKind,
    #[builder(default)]
    attribute_overrides: Vec<AttributePayload>,
    #[builder(default)]
    faults: Vec<FakeFault>,
    /// Hide the beams service even on an extended board.
    #[builder(default)]
    omit_beams: bool,
    #[builder(default)]
    discovery_delay: Duration,
}

/// Counters shared by every link a fake backend hands out.
#[derive(Debug, Default)]
struct FakeStats {
    connects: AtomicUsize,
    discoveries: AtomicUsize,
    service_resolutions: AtomicUsize,
    characteristic_resolutions: AtomicUsize,
    reads: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Read-only view of fake transport activity, used by tests.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    stats: Arc<FakeStats>,
}

impl FakeProbe {
    #[must_use]
    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn discoveries(&self) -> usize {
        self.stats.discoveries.load(Ordering::SeqCst)
    }

    /// Number of service handles resolved through the transport.
    #[must_use]
    pub fn service_resolutions(&self) -> usize {
        self.stats.service_resolutions.load(Ordering::SeqCst)
    }

    /// Number of characteristic handles resolved through the transport.
    #[must_use]
    pub fn characteristic_resolutions(&self) -> usize {
        self.stats.characteristic_resolutions.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.stats.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.stats.disconnects.load(Ordering::SeqCst)
    }
}

/// The simulated board behind every fake link.
#[derive(Debug)]
struct FakeBoard {
    services: HashSet<ServiceId>,
    payloads: HashMap<AttributeId, Vec<u8>>,
    faults: Vec<FakeFault>,
}

impl FakeBoard {
    fn fault_on(&self, attempt: u64, matches: impl Fn(FakeFault) -> bool) -> Option<FakeFault> {
        self.faults
            .iter()
            .copied()
            .find(|fault| fault.attempt() == attempt && matches(*fault))
    }
}

/// Fake backend used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    devices: Vec<FoundDevice>,
    board: Arc<FakeBoard>,
    discovery_delay: Duration,
    stats: Arc<FakeStats>,
}

impl FakeBackend {
    /// Creates a fake backend from explicit settings.
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let mut payloads = preset_payloads(config.board);
        for AttributePayload { attribute, payload } in config.attribute_overrides {
            payloads.insert(attribute, payload);
        }

        let mut services = HashSet::from([
            ServiceId::DeviceInformation,
            ServiceId::MotorDriver,
            ServiceId::Battery,
        ]);
        if config.board == ProfileKind::Extended && !config.omit_beams {
            services.insert(ServiceId::Beams);
        }

        Self {
            devices: config.scan_fixture.into(),
            board: Arc::new(FakeBoard {
                services,
                payloads,
                faults: config.faults,
            }),
            discovery_delay: config.discovery_delay,
            stats: Arc::default(),
        }
    }

    pub(crate) fn probe(&self) -> FakeProbe {
        FakeProbe {
            stats: Arc::clone(&self.stats),
        }
    }

    /// Picks the first fixture device matching `selection`.
    #[instrument(skip(self), level = "debug", fields(prefix = selection.name_prefix()))]
    pub(crate) async fn select_first_matching(
        &self,
        selection: &DeviceSelection,
    ) -> Result<FakeBoardLink, InteractionError> {
        if !self.discovery_delay.is_zero() {
            if self.discovery_delay > selection.timeout() {
                sleep(selection.timeout()).await;
                return Err(InteractionError::SelectionCancelled);
            }
            sleep(self.discovery_delay).await;
        }

        let device = self
            .devices
            .iter()
            .find(|device| device.matches_name_prefix(selection.name_prefix()))
            .cloned()
            .ok_or_else(|| InteractionError::NoMatchingFixtureDevice {
                prefix: selection.name_prefix().unwrap_or_default().to_string(),
            })?;
        debug!(device = device.display_name(), "selected fixture device");

        let (link_state, _) = watch::channel(LinkState::Disconnected);
        Ok(FakeBoardLink {
            device,
            board: Arc::clone(&self.board),
            stats: Arc::clone(&self.stats),
            generation: AtomicU64::new(0),
            link_state,
        })
    }
}

/// A link to the simulated board.
#[derive(Debug)]
pub(crate) struct FakeBoardLink {
    device: FoundDevice,
    board: Arc<FakeBoard>,
    stats: Arc<FakeStats>,
    generation: AtomicU64,
    link_state: watch::Sender<LinkState>,
}

impl FakeBoardLink {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), InteractionError> {
        match *self.link_state.borrow() {
            LinkState::Connected => Ok(()),
            LinkState::Disconnected => Err(InteractionError::Disconnected),
        }
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
}

#[async_trait]
impl BoardLink for FakeBoardLink {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link_state.subscribe()
    }

    async fn connect(&self) -> Result<(), InteractionError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let attempt = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(fault) = self
            .board
            .fault_on(attempt, |fault| matches!(fault, FakeFault::Connect { .. }))
        {
            warn!(%fault, "injecting fake connect failure");
            return Err(InteractionError::ScriptedFault {
                fault: fault.to_string(),
            });
        }
        self.link_state.send_replace(LinkState::Connected);
        Ok(())
    }

    async fn discover_services(&self) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        self.stats.discoveries.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.board.fault_on(self.current_generation(), |fault| {
            matches!(fault, FakeFault::Discover { .. })
        }) {
            warn!(%fault, "injecting fake discovery failure");
            return Err(InteractionError::ScriptedFault {
                fault: fault.to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_service(&self, service: Uuid) -> Result<ServiceHandle, InteractionError> {
        self.ensure_connected()?;
        self.stats.service_resolutions.fetch_add(1, Ordering::SeqCst);
        ServiceId::for_uuid(service)
            .filter(|known| self.board.services.contains(known))
            .map(|_| ServiceHandle::new(service, self.current_generation()))
            .ok_or(InteractionError::ServiceNotFound { service })
    }

    async fn resolve_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, InteractionError> {
        self.ensure_current(service.generation())?;
        self.ensure_connected()?;
        self.stats
            .characteristic_resolutions
            .fetch_add(1, Ordering::SeqCst);
        attribute_for_address(AttributeAddress::new(service.uuid(), characteristic))
            .filter(|attribute| self.board.payloads.contains_key(attribute))
            .map(|_| CharacteristicHandle::new(service, characteristic))
            .ok_or(InteractionError::CharacteristicNotFound {
                service: service.uuid(),
                characteristic,
            })
    }

    async fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<Vec<u8>, InteractionError> {
        self.ensure_current(characteristic.generation())?;
        self.ensure_connected()?;
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        let address = AttributeAddress::new(characteristic.service(), characteristic.uuid());
        let not_found = || InteractionError::CharacteristicNotFound {
            service: characteristic.service(),
            characteristic: characteristic.uuid(),
        };
        let attribute = attribute_for_address(address).ok_or_else(not_found)?;

        let fault = self.board.fault_on(self.current_generation(), |fault| {
            fault.attribute() == Some(attribute)
        });
        match fault {
            Some(fault @ FakeFault::Read { .. }) => {
                warn!(%fault, "injecting fake read failure");
                return Err(InteractionError::ScriptedFault {
                    fault: fault.to_string(),
                });
            }
            Some(fault @ FakeFault::Disconnect { .. }) => {
                warn!(%fault, "dropping fake link mid-read");
                self.link_state.send_replace(LinkState::Disconnected);
                std::future::pending::<()>().await;
            }
            Some(fault @ FakeFault::Stall { .. }) => {
                warn!(%fault, "stalling fake read");
                std::future::pending::<()>().await;
            }
            Some(FakeFault::Connect { .. } | FakeFault::Discover { .. }) | None => {}
        }

        self.board
            .payloads
            .get(&attribute)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn disconnect(&self) -> Result<(), InteractionError> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.link_state.send_replace(LinkState::Disconnected);
        Ok(())
    }
}

fn preset_payloads(board: ProfileKind) -> HashMap<AttributeId, Vec<u8>> {
    match board {
        ProfileKind::Extended => HashMap::from([
            (AttributeId::MotorDriverFirmware, b"v2.7.2".to_vec()),
            (AttributeId::MotorDriverModel, vec![4]),
            (AttributeId::MotorDriverSerial, b"XYZ000123456789".to_vec()),
            (AttributeId::Odometer, 1_000_000u32.to_le_bytes().to_vec()),
            (AttributeId::RideModeCount, vec![5]),
            (AttributeId::CurrentRideMode, vec![3]),
            (AttributeId::BatteryFirmware, vec![2, 5, 1]),
            (
                AttributeId::BatterySerial,
                0x00C0_FFEEu32.to_le_bytes().to_vec(),
            ),
            (AttributeId::BatteryStateOfCharge, vec![87]),
            (
                AttributeId::BatteryCapacity,
                3_500_000u32.to_le_bytes().to_vec(),
            ),
        ]),
        ProfileKind::Legacy => HashMap::from([
            (AttributeId::MotorDriverFirmware, b"v2.5.5".to_vec()),
            (AttributeId::MotorDriverModel, vec![1]),
            (AttributeId::Odometer, 500_000u32.to_le_bytes().to_vec()),
            (AttributeId::RideModeCount, vec![4]),
            (AttributeId::CurrentRideMode, vec![1]),
            (AttributeId::BatteryModel, vec![1]),
            (AttributeId::BatteryFirmware, vec![2, 5, 1]),
            (AttributeId::BatteryStateOfCharge, vec![64]),
        ]),
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [adapter, device_id, local_name, rssi] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = (*local_name != "-").then(|| (*local_name).to_string());
    let rssi = if *rssi == "-" {
        None
    } else {
        Some(rssi.parse::<i16>()?)
    };

    Ok(FoundDevice::new(
        (*adapter).to_string(),
        (*device_id).to_string(),
        local_name,
        rssi,
    ))
}

fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(cleaned)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn fixture() -> ScanFixture {
        "hci0|AA:BB|Boosted Board 1A2B|-48"
            .parse()
            .expect("fixture should parse")
    }

    #[rstest]
    #[case("hci0|AA:BB|Boosted Board 1A2B|-43", 1)]
    #[case("hci0|AA:BB|Boosted Board 1A2B|-43;hci1|CC:DD|Speaker|-", 2)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_fixture_rejects_invalid_field_count() {
        let result = parse_scan_fixture("hci0|AA:BB|Boosted Board");
        assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount));
    }

    #[rstest]
    #[case("odometer=40420f00", AttributeId::Odometer, vec![0x40, 0x42, 0x0F, 0x00])]
    #[case("ride_mode_count = 07", AttributeId::RideModeCount, vec![0x07])]
    #[case("battery_firmware=02 05 01", AttributeId::BatteryFirmware, vec![2, 5, 1])]
    fn attribute_payloads_parse(
        #[case] raw: &str,
        #[case] attribute: AttributeId,
        #[case] payload: Vec<u8>,
    ) {
        let parsed: AttributePayload = raw.parse().expect("payload override should parse");
        assert_eq!(AttributePayload { attribute, payload }, parsed);
    }

    #[test]
    fn attribute_payloads_reject_bad_input() {
        assert_matches!(
            "odometer".parse::<AttributePayload>(),
            Err(FixtureError::InvalidAttributePayload { .. })
        );
        assert_matches!(
            "warp_drive=00".parse::<AttributePayload>(),
            Err(FixtureError::UnknownAttribute { name }) if name == "warp_drive"
        );
        assert_matches!(
            "odometer=ABC".parse::<AttributePayload>(),
            Err(FixtureError::InvalidHex(_))
        );
    }

    #[rstest]
    #[case("connect@1", FakeFault::Connect { attempt: 1 })]
    #[case("discover@2", FakeFault::Discover { attempt: 2 })]
    #[case("read:odometer@3", FakeFault::Read { attribute: AttributeId::Odometer, attempt: 3 })]
    #[case(
        "disconnect:battery_firmware@1",
        FakeFault::Disconnect { attribute: AttributeId::BatteryFirmware, attempt: 1 }
    )]
    #[case(
        "stall:motor_driver_model@2",
        FakeFault::Stall { attribute: AttributeId::MotorDriverModel, attempt: 2 }
    )]
    fn faults_parse_and_render(#[case] raw: &str, #[case] expected: FakeFault) {
        let parsed: FakeFault = raw.parse().expect("fault should parse");
        assert_eq!(expected, parsed);
        assert_eq!(raw, parsed.to_string());
    }

    #[rstest]
    #[case("connect")]
    #[case("connect@0")]
    #[case("explode@1")]
    #[case("read@1")]
    #[case("read:odometer@x")]
    #[case("melt:odometer@1")]
    fn faults_reject_malformed_input(#[case] raw: &str) {
        assert_matches!(
            raw.parse::<FakeFault>(),
            Err(FixtureError::InvalidFault { .. })
        );
    }

    #[tokio::test]
    async fn handles_from_an_earlier_connection_are_stale() {
        let backend = FakeBackend::new(FakeBackendConfig::builder().scan_fixture(fixture()).build());
        let link = backend
            .select_first_matching(&DeviceSelection::default())
            .await
            .expect("fixture device should be selected");

        link.connect().await.expect("first connect should succeed");
        let service = link
            .resolve_service(ServiceId::MotorDriver.uuid())
            .await
            .expect("motor driver service should resolve");
        link.disconnect().await.expect("disconnect should succeed");
        link.connect().await.expect("second connect should succeed");

        let result = link
            .resolve_characteristic(&service, AttributeId::Odometer.address().characteristic())
            .await;
        assert_matches!(
            result,
            Err(InteractionError::StaleHandle {
                handle_generation: 1,
                current_generation: 2
            })
        );
    }

    #[tokio::test]
    async fn legacy_board_hides_extended_attributes() {
        let backend = FakeBackend::new(
            FakeBackendConfig::builder()
                .scan_fixture(fixture())
                .board(ProfileKind::Legacy)
                .build(),
        );
        let link = backend
            .select_first_matching(&DeviceSelection::default())
            .await
            .expect("fixture device should be selected");
        link.connect().await.expect("connect should succeed");

        let battery = link
            .resolve_service(ServiceId::Battery.uuid())
            .await
            .expect("battery service should resolve");
        let capacity = link
            .resolve_characteristic(
                &battery,
                AttributeId::BatteryCapacity.address().characteristic(),
            )
            .await;
        assert_matches!(
            capacity,
            Err(InteractionError::CharacteristicNotFound { .. })
        );
        assert_matches!(
            link.resolve_service(ServiceId::Beams.uuid()).await,
            Err(InteractionError::ServiceNotFound { .. })
        );
    }

    #[tokio::test]
    async fn selection_requires_a_matching_name() {
        let backend = FakeBackend::new(FakeBackendConfig::builder().scan_fixture(fixture()).build());
        let selection = DeviceSelection::builder().name_prefix("Speaker").build();

        let result = backend.select_first_matching(&selection).await;
        assert_matches!(
            result,
            Err(InteractionError::NoMatchingFixtureDevice { prefix }) if prefix == "Speaker"
        );
    }
}
