use clap::ValueEnum;
use derive_more::Display;
use serde::Serialize;
use serde_with::SerializeDisplay;

use super::record::RecordKey;
use crate::error::LookupError;

/// Protocol revision a board is decoded with.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, SerializeDisplay, ValueEnum,
)]
pub enum ProfileKind {
    /// Early firmware exposing only the minimal field set.
    #[display("legacy")]
    Legacy,
    /// Current firmware with serial numbers, beams and capacity.
    #[default]
    #[display("extended")]
    Extended,
}

/// Lookup table a code is resolved against.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub enum LookupTable {
    #[display("board model")]
    BoardModel,
    #[display("ride mode")]
    RideMode,
    #[display("battery model")]
    BatteryModel,
}

/// Where the battery model code is read from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, SerializeDisplay)]
pub enum BatteryModelSource {
    /// Byte 0 of the dedicated battery-model attribute.
    #[display("battery model attribute")]
    ModelAttribute,
    /// Byte 0 of the battery firmware attribute.
    #[display("battery firmware major version")]
    FirmwareMajor,
}

/// Optional fields a profile knows how to read.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Capabilities {
    pub motor_driver_serial: bool,
    pub beams_probe: bool,
    pub battery_serial: bool,
    pub battery_capacity: bool,
}

/// Odometer count-to-miles conversion, selected by board model code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum OdometerScale {
    /// Compact boards (model codes 4 and 5).
    #[display("compact")]
    Compact,
    /// Model code 7.
    #[display("rev")]
    Rev,
    /// Every other board.
    #[display("standard")]
    Standard,
}

impl OdometerScale {
    /// Selects the scale for a board model code.
    #[must_use]
    pub fn for_model(model_code: u8) -> Self {
        match model_code {
            4 | 5 => Self::Compact,
            7 => Self::Rev,
            _ => Self::Standard,
        }
    }

    /// Miles travelled per odometer count.
    #[must_use]
    pub fn miles_per_count(self) -> f64 {
        match self {
            Self::Compact => 3.6128e-5,
            Self::Rev => 6.213_727_366_5e-4,
            Self::Standard => 3.8386e-5,
        }
    }
}

const RIDE_MODES: &[&str] = &["Beginner", "Eco", "Expert", "Pro", "Hyper"];

const LATEST_MOTOR_DRIVER_FIRMWARE: &str = "v2.7.2";

static LEGACY_PROFILE: DeviceProfile = DeviceProfile {
    kind: ProfileKind::Legacy,
    board_models: &[
        (1, "Boosted Dual"),
        (2, "Boosted Dual+"),
        (3, "Boosted Plus"),
        (4, "Boosted Stealth"),
        (5, "Boosted Mini S"),
    ],
    ride_modes: RIDE_MODES,
    battery_models: &[(1, "B2SR"), (2, "B2XR")],
    latest_firmware: LATEST_MOTOR_DRIVER_FIRMWARE,
    good_battery_firmware: &["v2.5.1"],
    battery_model_source: BatteryModelSource::ModelAttribute,
    capabilities: Capabilities {
        motor_driver_serial: false,
        beams_probe: false,
        battery_serial: false,
        battery_capacity: false,
    },
};

static EXTENDED_PROFILE: DeviceProfile = DeviceProfile {
    kind: ProfileKind::Extended,
    board_models: &[
        (1, "Boosted Dual"),
        (2, "Boosted Dual+"),
        (3, "Boosted Plus"),
        (4, "Boosted Stealth"),
        (5, "Boosted Mini S"),
        (6, "Boosted Mini X"),
        (7, "Boosted Rev"),
    ],
    ride_modes: RIDE_MODES,
    battery_models: &[
        (0, "UNKNOWN 0"),
        (1, "B2SR"),
        (2, "B2XR"),
        (3, "UNKNOWN 3"),
        (4, "UNKNOWN 4"),
    ],
    latest_firmware: LATEST_MOTOR_DRIVER_FIRMWARE,
    good_battery_firmware: &["v2.5.1", "v1.6.3"],
    battery_model_source: BatteryModelSource::FirmwareMajor,
    capabilities: Capabilities {
        motor_driver_serial: true,
        beams_probe: true,
        battery_serial: true,
        battery_capacity: true,
    },
};

/// Lookup tables and formula selection for one protocol revision.
///
/// Both revisions share this type; they differ only in table contents and in
/// which optional fields their [`Capabilities`] enable.
#[derive(Debug, Eq, PartialEq)]
pub struct DeviceProfile {
    kind: ProfileKind,
    board_models: &'static [(u8, &'static str)],
    ride_modes: &'static [&'static str],
    battery_models: &'static [(u8, &'static str)],
    latest_firmware: &'static str,
    good_battery_firmware: &'static [&'static str],
    battery_model_source: BatteryModelSource,
    capabilities: Capabilities,
}

impl DeviceProfile {
    /// Returns the profile for a protocol revision.
    ///
    /// ```
    /// use boardcheck::{DeviceProfile, ProfileKind};
    ///
    /// let profile = DeviceProfile::for_kind(ProfileKind::Legacy);
    /// assert_eq!(Ok("Boosted Dual"), profile.board_model(1));
    /// ```
    #[must_use]
    pub fn for_kind(kind: ProfileKind) -> &'static Self {
        match kind {
            ProfileKind::Legacy => &LEGACY_PROFILE,
            ProfileKind::Extended => &EXTENDED_PROFILE,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Resolves a board model code to its display name.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownCode`] when the table has no entry for `code`.
    pub fn board_model(&self, code: u8) -> Result<&'static str, LookupError> {
        find_code(self.board_models, code).ok_or(LookupError::UnknownCode {
            table: LookupTable::BoardModel,
            code,
        })
    }

    /// Resolves a ride-mode index to its display name.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownCode`] when `index` is past the end of the table.
    pub fn ride_mode(&self, index: u8) -> Result<&'static str, LookupError> {
        self.ride_modes
            .get(usize::from(index))
            .copied()
            .ok_or(LookupError::UnknownCode {
                table: LookupTable::RideMode,
                code: index,
            })
    }

    /// Resolves a battery model code to its display name.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownCode`] when the table has no entry for `code`.
    pub fn battery_model(&self, code: u8) -> Result<&'static str, LookupError> {
        find_code(self.battery_models, code).ok_or(LookupError::UnknownCode {
            table: LookupTable::BatteryModel,
            code,
        })
    }

    #[must_use]
    pub fn board_models(&self) -> &'static [(u8, &'static str)] {
        self.board_models
    }

    /// Ride-mode names in index order.
    #[must_use]
    pub fn ride_modes(&self) -> &'static [&'static str] {
        self.ride_modes
    }

    #[must_use]
    pub fn battery_models(&self) -> &'static [(u8, &'static str)] {
        self.battery_models
    }

    /// Odometer conversion used for a board model code.
    #[must_use]
    pub fn odometer_scale(&self, model_code: u8) -> OdometerScale {
        OdometerScale::for_model(model_code)
    }

    /// Latest released motor-driver firmware string.
    #[must_use]
    pub fn latest_firmware(&self) -> &'static str {
        self.latest_firmware
    }

    /// Battery firmware versions considered current.
    #[must_use]
    pub fn good_battery_firmware(&self) -> &'static [&'static str] {
        self.good_battery_firmware
    }

    #[must_use]
    pub fn battery_model_source(&self) -> BatteryModelSource {
        self.battery_model_source
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Record keys this profile populates, in rendering order.
    pub fn record_keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        RecordKey::all().filter(|key| self.populates(*key))
    }

    fn populates(&self, key: RecordKey) -> bool {
        let capabilities = self.capabilities;
        match key {
            RecordKey::MdSerialNumber => capabilities.motor_driver_serial,
            RecordKey::MdBeamsSupported => capabilities.beams_probe,
            RecordKey::BatterySerialNumber => capabilities.battery_serial,
            RecordKey::BatteryCap => capabilities.battery_capacity,
            _ => true,
        }
    }
}

fn find_code(table: &'static [(u8, &'static str)], code: u8) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _name)| *candidate == code)
        .map(|(_code, name)| *name)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(4, OdometerScale::Compact)]
    #[case(5, OdometerScale::Compact)]
    #[case(7, OdometerScale::Rev)]
    #[case(1, OdometerScale::Standard)]
    #[case(6, OdometerScale::Standard)]
    #[case(200, OdometerScale::Standard)]
    fn odometer_scale_follows_model_code(#[case] code: u8, #[case] expected: OdometerScale) {
        assert_eq!(expected, OdometerScale::for_model(code));
    }

    #[rstest]
    #[case(ProfileKind::Legacy, 7, None)]
    #[case(ProfileKind::Extended, 7, Some("Boosted Rev"))]
    #[case(ProfileKind::Extended, 4, Some("Boosted Stealth"))]
    fn board_model_lookup_depends_on_profile(
        #[case] kind: ProfileKind,
        #[case] code: u8,
        #[case] expected: Option<&str>,
    ) {
        let profile = DeviceProfile::for_kind(kind);
        assert_eq!(expected, profile.board_model(code).ok());
    }

    #[test]
    fn ride_mode_past_table_end_is_unknown() {
        let error = DeviceProfile::for_kind(ProfileKind::Extended)
            .ride_mode(5)
            .expect_err("index 5 is past the canonical table");
        assert_matches!(
            error,
            LookupError::UnknownCode {
                table: LookupTable::RideMode,
                code: 5
            }
        );
    }

    #[test]
    fn legacy_profile_omits_optional_record_keys() {
        let keys: Vec<String> = DeviceProfile::for_kind(ProfileKind::Legacy)
            .record_keys()
            .map(|key| key.to_string())
            .collect();
        assert_eq!(
            vec![
                "status",
                "md-model",
                "md-firmware-version",
                "md-odo",
                "md-ride-modes",
                "md-current-ride-mode",
                "battery-model",
                "battery-firmware-version",
                "battery-soc",
            ],
            keys
        );
    }

    #[test]
    fn extended_profile_populates_every_record_key() {
        let profile = DeviceProfile::for_kind(ProfileKind::Extended);
        assert_eq!(RecordKey::all().count(), profile.record_keys().count());
    }
}
