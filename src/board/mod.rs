pub mod decode;
mod profile;
mod record;

pub use self::decode::{
    BatteryCapacity, FirmwareStatus, Lookup, Odometer, RideModes, VersionClass,
};
pub use self::profile::{
    BatteryModelSource, Capabilities, DeviceProfile, LookupTable, OdometerScale, ProfileKind,
};
pub use self::record::{DecodedRecord, ProfileGap, RecordKey, VERSION_TAGS_KEY};
