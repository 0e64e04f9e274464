use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::ser::{Serialize, SerializeMap, Serializer};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use super::decode::{FirmwareStatus, VersionClass};
use super::profile::LookupTable;

/// JSON key holding the `ok`/`stale` tag of every classified firmware field.
pub const VERSION_TAGS_KEY: &str = "version-tags";

/// Stable output keys consumed by renderers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, EnumIter, Display)]
pub enum RecordKey {
    #[strum(to_string = "status")]
    Status,
    #[strum(to_string = "md-model")]
    MdModel,
    #[strum(to_string = "md-firmware-version")]
    MdFirmwareVersion,
    #[strum(to_string = "md-serial-number")]
    MdSerialNumber,
    #[strum(to_string = "md-odo")]
    MdOdo,
    #[strum(to_string = "md-ride-modes")]
    MdRideModes,
    #[strum(to_string = "md-current-ride-mode")]
    MdCurrentRideMode,
    #[strum(to_string = "md-beams-supported")]
    MdBeamsSupported,
    #[strum(to_string = "battery-model")]
    BatteryModel,
    #[strum(to_string = "battery-serial-number")]
    BatterySerialNumber,
    #[strum(to_string = "battery-firmware-version")]
    BatteryFirmwareVersion,
    #[strum(to_string = "battery-soc")]
    BatterySoc,
    #[strum(to_string = "battery-cap")]
    BatteryCap,
}

impl RecordKey {
    /// All keys in rendering order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

/// A code the active profile could not resolve.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProfileGap {
    table: LookupTable,
    code: u8,
}

impl ProfileGap {
    pub(crate) fn new(table: LookupTable, code: u8) -> Self {
        Self { table, code }
    }

    #[must_use]
    pub fn table(self) -> LookupTable {
        self.table
    }

    #[must_use]
    pub fn code(self) -> u8 {
        self.code
    }
}

impl Display for ProfileGap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} code {} has no profile entry", self.table, self.code)
    }
}

/// Decoded board values keyed by [`RecordKey`].
///
/// Records are built from per-subsystem partials with [`DecodedRecord::merge`]:
/// keys present in the partial overwrite, keys absent from it are kept.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DecodedRecord {
    fields: BTreeMap<RecordKey, String>,
    classes: BTreeMap<RecordKey, VersionClass>,
    gaps: Vec<ProfileGap>,
}

impl DecodedRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record holding only a status line.
    ///
    /// ```
    /// use boardcheck::{DecodedRecord, RecordKey};
    ///
    /// let record = DecodedRecord::status("Connecting to device...");
    /// assert_eq!(Some("Connecting to device..."), record.get(RecordKey::Status));
    /// ```
    #[must_use]
    pub fn status(text: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert(RecordKey::Status, text);
        record
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, key: RecordKey, value: impl Into<String>) {
        self.fields.insert(key, value.into());
        self.classes.remove(&key);
    }

    /// Sets a firmware field together with its version classification.
    pub fn insert_firmware(&mut self, key: RecordKey, status: &FirmwareStatus) {
        self.fields.insert(key, status.to_string());
        self.classes.insert(key, status.class());
    }

    pub(crate) fn note_gap(&mut self, gap: ProfileGap) {
        self.gaps.push(gap);
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, key: RecordKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    /// Returns the version classification attached to a firmware field.
    #[must_use]
    pub fn class(&self, key: RecordKey) -> Option<VersionClass> {
        self.classes.get(&key).copied()
    }

    /// Codes that were surfaced raw because the profile had no entry for them.
    #[must_use]
    pub fn gaps(&self) -> &[ProfileGap] {
        &self.gaps
    }

    /// Fields in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordKey, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merges a partial record into this one.
    pub fn merge(&mut self, partial: DecodedRecord) {
        let DecodedRecord {
            fields,
            classes,
            gaps,
        } = partial;
        for (key, value) in fields {
            self.insert(key, value);
        }
        self.classes.extend(classes);
        self.gaps.extend(gaps);
    }

    /// Consuming variant of [`DecodedRecord::merge`].
    #[must_use]
    pub fn merged(mut self, partial: DecodedRecord) -> Self {
        self.merge(partial);
        self
    }
}

impl Serialize for DecodedRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let has_tags = !self.classes.is_empty();
        let mut map = serializer.serialize_map(Some(self.fields.len() + usize::from(has_tags)))?;
        for (key, value) in &self.fields {
            map.serialize_entry(&key.to_string(), value)?;
        }
        if has_tags {
            let tags: BTreeMap<String, &str> = self
                .classes
                .iter()
                .map(|(key, class)| (key.to_string(), class.tag()))
                .collect();
            map.serialize_entry(VERSION_TAGS_KEY, &tags)?;
        }
        map.end()
    }
}
