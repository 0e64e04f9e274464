use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
const MOTOR_DRIVER_SERVICE_UUID: Uuid = Uuid::from_u128(0x7dc55a86_c61f_11e5_9912_ba0be0483c18);
const BEAMS_SERVICE_UUID: Uuid = Uuid::from_u128(0xea32b817_d410_42e2_848a_1218201468fc);
const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x65a8eaa8_c61f_11e5_9912_ba0be0483c18);

/// GATT services exposed by a board.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum ServiceId {
    /// Standard device-information service carrying the firmware revision.
    #[strum(to_string = "device_information")]
    DeviceInformation,
    /// Motor-driver telemetry service.
    #[strum(to_string = "motor_driver")]
    MotorDriver,
    /// Optional service only present on boards with beams (lights) support.
    #[strum(to_string = "beams")]
    Beams,
    /// Battery-pack telemetry service.
    #[strum(to_string = "battery")]
    Battery,
}

impl ServiceId {
    /// Service UUID.
    #[must_use]
    pub fn uuid(self) -> Uuid {
        match self {
            Self::DeviceInformation => DEVICE_INFORMATION_SERVICE_UUID,
            Self::MotorDriver => MOTOR_DRIVER_SERVICE_UUID,
            Self::Beams => BEAMS_SERVICE_UUID,
            Self::Battery => BATTERY_SERVICE_UUID,
        }
    }

    /// Human-readable service name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceInformation => "device information",
            Self::MotorDriver => "motor driver",
            Self::Beams => "beams",
            Self::Battery => "battery",
        }
    }

    pub(crate) fn for_uuid(uuid: Uuid) -> Option<Self> {
        Self::iter().find(|service| service.uuid() == uuid)
    }
}

/// Known readable board attributes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttributeId {
    /// Motor-driver firmware revision, UTF-8 text.
    MotorDriverFirmware,
    /// Board model code, one byte.
    MotorDriverModel,
    /// Motor-driver identifier text whose suffix is the serial number.
    MotorDriverSerial,
    /// Odometer count, `u32` little-endian.
    Odometer,
    /// Number of unlocked ride modes, one byte.
    RideModeCount,
    /// Index of the active ride mode, one byte.
    CurrentRideMode,
    /// Battery model code, one byte.
    BatteryModel,
    /// Battery firmware version, three bytes.
    BatteryFirmware,
    /// Battery serial number, `u32` little-endian.
    BatterySerial,
    /// Battery state of charge in percent, one byte.
    BatteryStateOfCharge,
    /// Raw battery capacity counter, `u32` little-endian.
    BatteryCapacity,
}

impl AttributeId {
    /// Returns the service/characteristic pair for this attribute.
    #[must_use]
    pub fn address(self) -> AttributeAddress {
        attribute_metadata(self).address
    }

    /// Returns the service containing this attribute.
    #[must_use]
    pub fn service(self) -> ServiceId {
        attribute_metadata(self).service
    }

    /// Human-readable attribute name.
    #[must_use]
    pub fn name(self) -> &'static str {
        attribute_metadata(self).name
    }
}

/// A `(service, characteristic)` pair identifying one readable value.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct AttributeAddress {
    service: Uuid,
    characteristic: Uuid,
}

impl AttributeAddress {
    /// Creates an attribute address.
    #[must_use]
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    /// Service UUID.
    #[must_use]
    pub fn service(self) -> Uuid {
        self.service
    }

    /// Characteristic UUID.
    #[must_use]
    pub fn characteristic(self) -> Uuid {
        self.characteristic
    }
}

impl Display for AttributeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match ATTRIBUTES_BY_ADDRESS.get(self) {
            Some(attribute) => write!(f, "{attribute} ({})", self.characteristic),
            None => write!(f, "{}/{}", self.service, self.characteristic),
        }
    }
}

/// Descriptive metadata for one attribute.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct AttributeMetadata {
    name: &'static str,
    service: ServiceId,
    address: AttributeAddress,
}

/// Attribute IDs keyed by their GATT address.
static ATTRIBUTES_BY_ADDRESS: LazyLock<HashMap<AttributeAddress, AttributeId>> =
    LazyLock::new(|| {
        AttributeId::iter()
            .map(|attribute| (attribute.address(), attribute))
            .collect()
    });

/// Returns the known attribute at an address, if any.
pub(crate) fn attribute_for_address(address: AttributeAddress) -> Option<AttributeId> {
    ATTRIBUTES_BY_ADDRESS.get(&address).copied()
}

pub(crate) fn attribute_metadata(attribute: AttributeId) -> AttributeMetadata {
    let (name, service, characteristic) = match attribute {
        AttributeId::MotorDriverFirmware => (
            "motor-driver firmware",
            ServiceId::DeviceInformation,
            0x00002a26_0000_1000_8000_00805f9b34fb,
        ),
        AttributeId::MotorDriverModel => (
            "motor-driver model",
            ServiceId::MotorDriver,
            0x7dc59643_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::MotorDriverSerial => (
            "motor-driver serial id",
            ServiceId::MotorDriver,
            0x7dc5bb39_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::Odometer => (
            "odometer",
            ServiceId::MotorDriver,
            0x7dc56594_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::RideModeCount => (
            "ride-mode count",
            ServiceId::MotorDriver,
            0x7dc55dec_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::CurrentRideMode => (
            "current ride mode",
            ServiceId::MotorDriver,
            0x7dc55f22_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::BatteryModel => (
            "battery model",
            ServiceId::Battery,
            0x65a8f832_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::BatteryFirmware => (
            "battery firmware",
            ServiceId::Battery,
            0x65a8f833_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::BatterySerial => (
            "battery serial",
            ServiceId::Battery,
            0x65a8f834_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::BatteryStateOfCharge => (
            "battery state of charge",
            ServiceId::Battery,
            0x65a8eeae_c61f_11e5_9912_ba0be0483c18,
        ),
        AttributeId::BatteryCapacity => (
            "battery capacity",
            ServiceId::Battery,
            0x65a8f3c2_c61f_11e5_9912_ba0be0483c18,
        ),
    };

    AttributeMetadata {
        name,
        service,
        address: AttributeAddress::new(service.uuid(), Uuid::from_u128(characteristic)),
    }
}
