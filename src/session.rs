//! Connect, discover, read and retry orchestration for one board check.

use std::time::Duration;

use bon::Builder;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::board::{
    BatteryModelSource, DecodedRecord, DeviceProfile, ProfileKind, RecordKey, decode,
};
use crate::error::{AttemptError, DecodeError, InteractionError, SessionError};
use crate::hw::{AttributeCache, BoardLink, DeviceSelection, HardwareClient, LinkState};
use crate::protocol::{AttributeId, ServiceId};

/// Attempts made before a session is reported as failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on a single characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const WAITING_FOR_SELECTION: &str = "Waiting for device selection";
pub(crate) const DISCONNECTED: &str = "Disconnected";
pub(crate) const CONNECTING: &str = "Connecting to device...";
pub(crate) const FAILED: &str = "Failed to read data. Try the troubleshooting steps.";
pub(crate) const BLUETOOTH_UNAVAILABLE: &str = "Bluetooth is not available on this system";

/// Group of attributes read together during an attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum Subsystem {
    #[strum(to_string = "device info")]
    DeviceInfo,
    #[strum(to_string = "motor driver")]
    MotorDriver,
    #[strum(to_string = "beams")]
    Beams,
    #[strum(to_string = "battery")]
    Battery,
}

impl Subsystem {
    /// Progress text shown while this subsystem is read.
    #[must_use]
    pub fn status_text(self) -> String {
        format!("Reading {self} data...")
    }
}

/// Where a controller is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, derive_more::Display)]
pub enum SessionState {
    #[default]
    #[display("idle")]
    Idle,
    #[display("selecting")]
    Selecting,
    #[display("connecting")]
    Connecting,
    #[display("discovering")]
    Discovering,
    #[display("reading {_0}")]
    Reading(Subsystem),
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
}

/// An update reported to a [`ResultSink`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionOutcome {
    /// A progress status line.
    InProgress(String),
    /// The merged record of a successful attempt.
    Success(DecodedRecord),
    /// The user-facing failure text.
    Failed(String),
}

impl SessionOutcome {
    /// Whether no further updates follow this one.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress(_))
    }

    /// The status line carried by this update.
    #[must_use]
    pub fn status(&self) -> &str {
        match self {
            Self::InProgress(status) | Self::Failed(status) => status,
            Self::Success(record) => record.get(RecordKey::Status).unwrap_or_default(),
        }
    }
}

/// Receives status updates and the final outcome of a session.
pub trait ResultSink {
    fn report(&mut self, outcome: &SessionOutcome);
}

impl ResultSink for Vec<SessionOutcome> {
    fn report(&mut self, outcome: &SessionOutcome) {
        self.push(outcome.clone());
    }
}

/// Settings for a [`SessionController`].
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    /// Protocol revision used to decode the board.
    #[builder(default)]
    profile: ProfileKind,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    #[builder(default = DEFAULT_READ_TIMEOUT)]
    read_timeout: Duration,
    #[builder(default)]
    selection: DeviceSelection,
}

impl SessionConfig {
    #[must_use]
    pub fn profile(&self) -> ProfileKind {
        self.profile
    }

    /// Attempt budget; never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[must_use]
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Drives device selection and the bounded connect-read retry loop.
///
/// Runs take `&mut self`, so one controller can never run two sessions at once.
/// Nothing but the configuration and the last run's bookkeeping survives a run.
#[derive(Debug, Default)]
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    attempts_used: u32,
}

impl SessionController {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            attempts_used: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempts consumed by the most recent run.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Selects a board through `client`, then runs a session against it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SelectionCancelled`] when no board was picked and
    /// [`SessionError::TransportUnavailable`] when the BLE stack cannot be used.
    /// Neither is retried.
    #[instrument(
        name = "check",
        skip_all,
        level = "info",
        fields(profile = %self.config.profile)
    )]
    pub async fn check(
        &mut self,
        client: &dyn HardwareClient,
        sink: &mut dyn ResultSink,
    ) -> Result<SessionOutcome, SessionError> {
        self.attempts_used = 0;
        self.state = SessionState::Selecting;
        sink.report(&SessionOutcome::InProgress(WAITING_FOR_SELECTION.to_string()));

        let link = match client.select_device(&self.config.selection).await {
            Ok(link) => link,
            Err(
                source @ (InteractionError::SelectionCancelled
                | InteractionError::NoMatchingFixtureDevice { .. }),
            ) => {
                info!(error = %source, "device selection ended without a board");
                self.state = SessionState::Idle;
                sink.report(&SessionOutcome::InProgress(DISCONNECTED.to_string()));
                return Err(SessionError::SelectionCancelled { source });
            }
            Err(source) => {
                warn!(error = ?source, "BLE transport is unavailable");
                self.state = SessionState::Failed;
                sink.report(&SessionOutcome::Failed(BLUETOOTH_UNAVAILABLE.to_string()));
                return Err(SessionError::TransportUnavailable { source });
            }
        };

        let outcome = self.run(link.as_ref(), sink).await;
        if let Err(error) = link.disconnect().await {
            debug!(?error, "failed to disconnect after the session");
        }
        Ok(outcome)
    }

    /// Runs the bounded connect-discover-read loop against an already selected link.
    #[instrument(
        name = "run",
        skip_all,
        level = "debug",
        fields(device = link.device().display_name())
    )]
    pub async fn run(&mut self, link: &dyn BoardLink, sink: &mut dyn ResultSink) -> SessionOutcome {
        let profile = DeviceProfile::for_kind(self.config.profile);
        let max_attempts = self.config.max_attempts();
        let mut cache = AttributeCache::new();
        self.attempts_used = 0;
        sink.report(&SessionOutcome::InProgress(CONNECTING.to_string()));

        for attempt in 1..=max_attempts {
            self.attempts_used = attempt;
            match self.attempt(link, profile, &mut cache, sink).await {
                Ok(record) => {
                    self.state = SessionState::Succeeded;
                    let status = format!("Connected to {}", link.device().display_name());
                    info!(attempt, gaps = record.gaps().len(), "board check succeeded");
                    let outcome = SessionOutcome::Success(record.merged(DecodedRecord::status(status)));
                    sink.report(&outcome);
                    return outcome;
                }
                Err(error) => {
                    warn!(attempt, max_attempts, ?error, "attempt failed");
                    if matches!(error, AttemptError::Disconnected) {
                        sink.report(&SessionOutcome::InProgress(DISCONNECTED.to_string()));
                    }
                    if let Err(error) = link.disconnect().await {
                        debug!(?error, "failed to tear down the link after a failed attempt");
                    }
                }
            }
        }

        self.state = SessionState::Failed;
        let outcome = SessionOutcome::Failed(FAILED.to_string());
        sink.report(&outcome);
        outcome
    }

    async fn attempt(
        &mut self,
        link: &dyn BoardLink,
        profile: &'static DeviceProfile,
        cache: &mut AttributeCache,
        sink: &mut dyn ResultSink,
    ) -> Result<DecodedRecord, AttemptError> {
        self.state = SessionState::Connecting;
        link.connect().await.map_err(AttemptError::ConnectFailed)?;

        let mut link_state = link.link_state();
        tokio::select! {
            biased;
            _ = link_state.wait_for(|state| *state == LinkState::Disconnected) => {
                Err(AttemptError::Disconnected)
            }
            result = self.discover_and_read(link, profile, cache, sink) => result,
        }
    }

    async fn discover_and_read(
        &mut self,
        link: &dyn BoardLink,
        profile: &'static DeviceProfile,
        cache: &mut AttributeCache,
        sink: &mut dyn ResultSink,
    ) -> Result<DecodedRecord, AttemptError> {
        self.state = SessionState::Discovering;
        link.discover_services()
            .await
            .map_err(AttemptError::DiscoveryFailed)?;
        cache.reset();

        let mut reader = AttemptReader {
            link,
            cache,
            profile,
            read_timeout: self.config.read_timeout,
        };
        let mut record = DecodedRecord::new();
        for subsystem in Subsystem::iter() {
            if subsystem == Subsystem::Beams && !profile.capabilities().beams_probe {
                continue;
            }
            self.state = SessionState::Reading(subsystem);
            sink.report(&SessionOutcome::InProgress(subsystem.status_text()));
            let partial = match subsystem {
                Subsystem::DeviceInfo => reader.device_info().await?,
                Subsystem::MotorDriver => reader.motor_driver().await?,
                Subsystem::Beams => reader.beams().await,
                Subsystem::Battery => reader.battery().await?,
            };
            record.merge(partial);
        }
        Ok(record)
    }
}

/// Reads and decodes subsystems within one attempt.
struct AttemptReader<'a> {
    link: &'a dyn BoardLink,
    cache: &'a mut AttributeCache,
    profile: &'static DeviceProfile,
    read_timeout: Duration,
}

impl AttemptReader<'_> {
    async fn read(&mut self, attribute: AttributeId) -> Result<Vec<u8>, AttemptError> {
        let address = attribute.address();
        let read = self
            .cache
            .read_characteristic(self.link, address.service(), address.characteristic());
        timeout(self.read_timeout, read)
            .await
            .unwrap_or_else(|_elapsed| {
                Err(InteractionError::ReadTimeout {
                    timeout: self.read_timeout,
                })
            })
            .map_err(|source| AttemptError::ReadFailed { attribute, source })
    }

    async fn device_info(&mut self) -> Result<DecodedRecord, AttemptError> {
        let payload = self.read(AttributeId::MotorDriverFirmware).await?;
        let mut record = DecodedRecord::new();
        record.insert_firmware(
            RecordKey::MdFirmwareVersion,
            &decode::firmware_status(&payload, self.profile),
        );
        Ok(record)
    }

    async fn motor_driver(&mut self) -> Result<DecodedRecord, AttemptError> {
        let profile = self.profile;
        let mut record = DecodedRecord::new();

        let payload = self.read(AttributeId::MotorDriverModel).await?;
        let model = decoded(
            AttributeId::MotorDriverModel,
            decode::board_model(&payload, profile),
        )?;
        record.insert(RecordKey::MdModel, model.to_string());
        if let Some(gap) = model.gap() {
            record.note_gap(gap);
        }

        if profile.capabilities().motor_driver_serial {
            let payload = self.read(AttributeId::MotorDriverSerial).await?;
            record.insert(RecordKey::MdSerialNumber, decode::serial_number(&payload));
        }

        let payload = self.read(AttributeId::Odometer).await?;
        let odometer = decoded(
            AttributeId::Odometer,
            decode::odometer(&payload, model.code(), profile),
        )?;
        record.insert(RecordKey::MdOdo, odometer.to_string());

        let payload = self.read(AttributeId::RideModeCount).await?;
        let modes = decoded(
            AttributeId::RideModeCount,
            decode::ride_modes(&payload, profile),
        )?;
        record.insert(RecordKey::MdRideModes, modes.to_string());
        if let Some(gap) = modes.gap() {
            record.note_gap(gap);
        }

        let payload = self.read(AttributeId::CurrentRideMode).await?;
        let current = decoded(
            AttributeId::CurrentRideMode,
            decode::current_ride_mode(&payload, profile),
        )?;
        record.insert(RecordKey::MdCurrentRideMode, current.to_string());
        if let Some(gap) = current.gap() {
            record.note_gap(gap);
        }

        Ok(record)
    }

    /// Probes for the beams service; any failure means "not supported".
    async fn beams(&mut self) -> DecodedRecord {
        let probe = self.cache.resolve_service(self.link, ServiceId::Beams.uuid());
        let present = match timeout(self.read_timeout, probe).await {
            Ok(Ok(_handle)) => true,
            Ok(Err(error)) => {
                debug!(?error, "beams service probe failed");
                false
            }
            Err(_elapsed) => {
                debug!("beams service probe timed out");
                false
            }
        };

        let mut record = DecodedRecord::new();
        record.insert(RecordKey::MdBeamsSupported, decode::beams_supported(present));
        record
    }

    async fn battery(&mut self) -> Result<DecodedRecord, AttemptError> {
        let profile = self.profile;
        let capabilities = profile.capabilities();
        let mut record = DecodedRecord::new();

        let firmware_payload = self.read(AttributeId::BatteryFirmware).await?;
        let (model_attribute, model_payload) = match profile.battery_model_source() {
            BatteryModelSource::ModelAttribute => (
                AttributeId::BatteryModel,
                self.read(AttributeId::BatteryModel).await?,
            ),
            BatteryModelSource::FirmwareMajor => {
                (AttributeId::BatteryFirmware, firmware_payload.clone())
            }
        };
        let model = decoded(
            model_attribute,
            decode::battery_model(&model_payload, profile),
        )?;
        record.insert(RecordKey::BatteryModel, model.to_string());
        if let Some(gap) = model.gap() {
            record.note_gap(gap);
        }

        if capabilities.battery_serial {
            let payload = self.read(AttributeId::BatterySerial).await?;
            let serial = decoded(AttributeId::BatterySerial, decode::battery_serial(&payload))?;
            record.insert(RecordKey::BatterySerialNumber, serial);
        }

        let firmware = decoded(
            AttributeId::BatteryFirmware,
            decode::battery_firmware(&firmware_payload, profile),
        )?;
        record.insert_firmware(RecordKey::BatteryFirmwareVersion, &firmware);

        let payload = self.read(AttributeId::BatteryStateOfCharge).await?;
        let soc = decoded(
            AttributeId::BatteryStateOfCharge,
            decode::state_of_charge(&payload),
        )?;
        record.insert(RecordKey::BatterySoc, soc);

        if capabilities.battery_capacity {
            let payload = self.read(AttributeId::BatteryCapacity).await?;
            let capacity = decoded(
                AttributeId::BatteryCapacity,
                decode::battery_capacity(&payload),
            )?;
            record.insert(RecordKey::BatteryCap, capacity.to_string());
        }

        Ok(record)
    }
}

fn decoded<T>(attribute: AttributeId, result: Result<T, DecodeError>) -> Result<T, AttemptError> {
    result.map_err(|source| AttemptError::Decode { attribute, source })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hw::{FakeBackendConfig, FakeFault, FakeProbe, fake_hardware_client_with_probe};

    fn client(
        board: ProfileKind,
        faults: Vec<FakeFault>,
    ) -> (Box<dyn HardwareClient>, FakeProbe) {
        let config = FakeBackendConfig::builder()
            .scan_fixture(
                "hci0|AA:BB|Boosted Board 1A2B|-48"
                    .parse()
                    .expect("fixture should parse"),
            )
            .board(board)
            .faults(faults)
            .build();
        fake_hardware_client_with_probe(config)
    }

    fn fault(raw: &str) -> FakeFault {
        raw.parse().expect("fault should parse")
    }

    fn statuses(updates: &[SessionOutcome]) -> Vec<&str> {
        updates.iter().map(SessionOutcome::status).collect()
    }

    #[rstest]
    #[case(Subsystem::DeviceInfo, "Reading device info data...")]
    #[case(Subsystem::MotorDriver, "Reading motor driver data...")]
    #[case(Subsystem::Beams, "Reading beams data...")]
    #[case(Subsystem::Battery, "Reading battery data...")]
    fn subsystem_status_texts(#[case] subsystem: Subsystem, #[case] expected: &str) {
        assert_eq!(expected, subsystem.status_text());
    }

    #[test]
    fn only_success_and_failure_are_terminal() {
        assert!(!SessionOutcome::InProgress(CONNECTING.to_string()).is_terminal());
        assert!(SessionOutcome::Failed(FAILED.to_string()).is_terminal());
        assert!(SessionOutcome::Success(DecodedRecord::new()).is_terminal());
    }

    #[tokio::test]
    async fn extended_check_reads_every_subsystem_in_order() {
        let (client, probe) = client(ProfileKind::Extended, Vec::new());
        let mut controller = SessionController::default();
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        assert_eq!(
            vec![
                WAITING_FOR_SELECTION,
                CONNECTING,
                "Reading device info data...",
                "Reading motor driver data...",
                "Reading beams data...",
                "Reading battery data...",
                "Connected to Boosted Board 1A2B",
            ],
            statuses(&updates)
        );
        let record = assert_matches!(outcome, SessionOutcome::Success(record) => record);
        assert_eq!(Some("Boosted Stealth"), record.get(RecordKey::MdModel));
        assert_eq!(Some("Yes"), record.get(RecordKey::MdBeamsSupported));
        assert_eq!(Some("B2XR"), record.get(RecordKey::BatteryModel));
        assert_eq!(Some("123456789"), record.get(RecordKey::MdSerialNumber));
        assert_eq!(SessionState::Succeeded, controller.state());
        assert_eq!(1, controller.attempts_used());
        assert_eq!(1, probe.connects());
    }

    #[tokio::test]
    async fn three_failed_attempts_end_in_failure() {
        let faults = vec![
            fault("connect@1"),
            fault("discover@2"),
            fault("read:odometer@3"),
        ];
        let (client, probe) = client(ProfileKind::Extended, faults);
        let mut controller = SessionController::default();
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        assert_eq!(SessionOutcome::Failed(FAILED.to_string()), outcome);
        assert_eq!(SessionState::Failed, controller.state());
        assert_eq!(3, controller.attempts_used());
        assert_eq!(3, probe.connects());
        assert_eq!(Some(&outcome), updates.last());
    }

    #[tokio::test]
    async fn retry_after_failure_resolves_handles_again() {
        let (client, probe) = client(
            ProfileKind::Extended,
            vec![fault("read:battery_state_of_charge@1")],
        );
        let mut controller = SessionController::default();
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        assert_matches!(outcome, SessionOutcome::Success(_));
        assert_eq!(2, controller.attempts_used());
        // Device information, motor driver, beams and battery services on each attempt.
        assert_eq!(8, probe.service_resolutions());
    }

    #[tokio::test]
    async fn disconnect_mid_read_costs_one_attempt() {
        let (client, probe) = client(
            ProfileKind::Extended,
            vec![fault("disconnect:odometer@1")],
        );
        let mut controller = SessionController::default();
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        assert!(outcome.is_terminal());
        assert_matches!(outcome, SessionOutcome::Success(_));
        assert_eq!(2, controller.attempts_used());
        assert_eq!(2, probe.connects());
        let statuses = statuses(&updates);
        let disconnected_at = statuses
            .iter()
            .position(|status| *status == DISCONNECTED)
            .expect("a disconnect status should be reported");
        assert_eq!("Reading device info data...", statuses[disconnected_at + 1]);
        assert_eq!(1, statuses.iter().filter(|status| **status == CONNECTING).count());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out_and_is_retried() {
        let (client, _probe) = client(
            ProfileKind::Extended,
            vec![
                fault("stall:motor_driver_model@1"),
                fault("stall:battery_capacity@2"),
                fault("stall:motor_driver_firmware@3"),
            ],
        );
        let config = SessionConfig::builder()
            .read_timeout(Duration::from_secs(2))
            .build();
        let mut controller = SessionController::new(config);
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        assert_eq!(SessionOutcome::Failed(FAILED.to_string()), outcome);
        assert_eq!(3, controller.attempts_used());
    }

    #[tokio::test]
    async fn legacy_profile_reads_the_minimal_field_set() {
        let (client, _probe) = client(ProfileKind::Legacy, Vec::new());
        let config = SessionConfig::builder().profile(ProfileKind::Legacy).build();
        let mut controller = SessionController::new(config);
        let mut updates = Vec::new();

        let outcome = controller
            .check(client.as_ref(), &mut updates)
            .await
            .expect("selection should succeed");

        let record = assert_matches!(outcome, SessionOutcome::Success(record) => record);
        let keys: Vec<RecordKey> = record.iter().map(|(key, _value)| key).collect();
        let expected: Vec<RecordKey> = DeviceProfile::for_kind(ProfileKind::Legacy)
            .record_keys()
            .collect();
        assert_eq!(expected, keys);
        assert_eq!(Some("B2SR"), record.get(RecordKey::BatteryModel));
        assert!(!statuses(&updates).contains(&"Reading beams data..."));
    }

    #[tokio::test]
    async fn missing_selection_is_terminal_without_retry() {
        let (client, probe) = client(ProfileKind::Extended, Vec::new());
        let config = SessionConfig::builder()
            .selection(DeviceSelection::builder().name_prefix("Speaker").build())
            .build();
        let mut controller = SessionController::new(config);
        let mut updates = Vec::new();

        let result = controller.check(client.as_ref(), &mut updates).await;

        assert_matches!(result, Err(SessionError::SelectionCancelled { .. }));
        assert_eq!(vec![WAITING_FOR_SELECTION, DISCONNECTED], statuses(&updates));
        assert_eq!(0, probe.connects());
        assert_eq!(0, controller.attempts_used());
    }
}
