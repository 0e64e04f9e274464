use std::time::Duration;

use bon::Builder;
use uuid::Uuid;

use crate::protocol::ServiceId;

/// Upper bound on how long device selection scans before giving up.
pub(crate) const DEFAULT_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// A discovered BLE peripheral that matched the selection filter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Name shown to the user: the local name, or the device id when unnamed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.device_id)
    }

    pub(crate) fn matches_name_prefix(&self, prefix: Option<&str>) -> bool {
        match prefix {
            None | Some("") => true,
            Some(prefix) => self
                .local_name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix)),
        }
    }
}

/// How a board is picked out of the peripherals in range.
#[derive(Debug, Clone, Builder)]
pub struct DeviceSelection {
    /// Only accept peripherals whose local name starts with this prefix.
    #[builder(into)]
    name_prefix: Option<String>,
    #[builder(default = DEFAULT_SELECTION_TIMEOUT)]
    timeout: Duration,
}

impl DeviceSelection {
    #[must_use]
    pub fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }

    /// Service every board advertises.
    #[must_use]
    pub fn service(&self) -> Uuid {
        ServiceId::MotorDriver.uuid()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Connection state reported asynchronously by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// A resolved service, valid only for the connection it was resolved on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ServiceHandle {
    uuid: Uuid,
    generation: u64,
}

impl ServiceHandle {
    pub(crate) fn new(uuid: Uuid, generation: u64) -> Self {
        Self { uuid, generation }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Connection generation this handle belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A resolved characteristic, valid only for the connection it was resolved on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CharacteristicHandle {
    service: Uuid,
    uuid: Uuid,
    generation: u64,
}

impl CharacteristicHandle {
    pub(crate) fn new(service: &ServiceHandle, uuid: Uuid) -> Self {
        Self {
            service: service.uuid,
            uuid,
            generation: service.generation,
        }
    }

    #[must_use]
    pub fn service(&self) -> Uuid {
        self.service
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn device(name: Option<&str>) -> FoundDevice {
        FoundDevice::new(
            "hci0".into(),
            "AA:BB:CC".into(),
            name.map(String::from),
            Some(-50),
        )
    }

    #[rstest]
    #[case(Some("Boosted Board 1A2B"), None, true)]
    #[case(Some("Boosted Board 1A2B"), Some("Boosted"), true)]
    #[case(Some("Speaker"), Some("Boosted"), false)]
    #[case(None, Some("Boosted"), false)]
    #[case(None, Some(""), true)]
    fn name_prefix_matching(
        #[case] name: Option<&str>,
        #[case] prefix: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, device(name).matches_name_prefix(prefix));
    }

    #[test]
    fn display_name_falls_back_to_device_id() {
        assert_eq!("AA:BB:CC", device(None).display_name());
        assert_eq!("Board", device(Some("Board")).display_name());
    }

    #[test]
    fn characteristic_handles_inherit_service_generation() {
        let service = ServiceHandle::new(ServiceId::Battery.uuid(), 3);
        let characteristic = CharacteristicHandle::new(&service, Uuid::nil());

        assert_eq!(3, characteristic.generation());
        assert_eq!(ServiceId::Battery.uuid(), characteristic.service());
    }
}
