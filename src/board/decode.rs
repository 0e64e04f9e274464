//! Pure decoding of raw attribute payloads.
//!
//! Multi-byte integers are little-endian. Codes missing from a profile table are
//! never errors: they decode to [`Lookup::Unknown`] so the raw code is still shown.

use std::fmt::{self, Display, Formatter};

use serde_with::SerializeDisplay;
use tracing::warn;

use super::profile::{DeviceProfile, LookupTable, OdometerScale};
use super::record::ProfileGap;
use crate::error::{DecodeError, LookupError};

/// Kilometres per mile.
pub const KM_PER_MILE: f64 = 1.60934;

/// Number of trailing characters of the motor-driver id that form the serial number.
pub const SERIAL_NUMBER_LEN: usize = 9;

/// Raw capacity counts above this use [`CAPACITY_HIGH_DIVISOR`].
///
/// Taken from the vendor app; unverified against any documented physical constant.
pub const CAPACITY_HIGH_THRESHOLD: u32 = 3_000_000;

/// Unverified vendor divisor for raw capacity counts above the threshold.
pub const CAPACITY_HIGH_DIVISOR: f64 = 2_000_000.0;

/// Unverified vendor divisor for raw capacity counts at or below the threshold.
pub const CAPACITY_LOW_DIVISOR: f64 = 2_400_000.0;

/// Whether a firmware version is current.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum VersionClass {
    #[display("latest")]
    Latest,
    #[display("old")]
    Old,
}

impl VersionClass {
    /// Short classification tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Latest => "ok",
            Self::Old => "stale",
        }
    }

    fn annotation(self) -> &'static str {
        match self {
            Self::Latest => "latest version",
            Self::Old => "old version",
        }
    }
}

/// A firmware version string and its classification.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FirmwareStatus {
    version: String,
    class: VersionClass,
}

impl FirmwareStatus {
    /// Classifies `version` against the known-good set.
    #[must_use]
    pub fn classify(version: String, known_good: &[&str]) -> Self {
        let class = if known_good.contains(&version.as_str()) {
            VersionClass::Latest
        } else {
            VersionClass::Old
        };
        Self { version, class }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn class(&self) -> VersionClass {
        self.class
    }
}

impl Display for FirmwareStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.class.annotation())
    }
}

/// Result of resolving a code against a profile table.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Lookup {
    Known { code: u8, name: &'static str },
    Unknown { table: LookupTable, code: u8 },
}

impl Lookup {
    fn resolve(code: u8, result: Result<&'static str, LookupError>) -> Self {
        match result {
            Ok(name) => Self::Known { code, name },
            Err(LookupError::UnknownCode { table, code }) => {
                warn!(%table, code, "code is missing from the profile table");
                Self::Unknown { table, code }
            }
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Known { code, .. } | Self::Unknown { code, .. } => code,
        }
    }

    /// The profile gap this lookup exposed, if any.
    #[must_use]
    pub fn gap(self) -> Option<ProfileGap> {
        match self {
            Self::Known { .. } => None,
            Self::Unknown { table, code } => Some(ProfileGap::new(table, code)),
        }
    }
}

impl Display for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { name, .. } => f.write_str(name),
            Self::Unknown { code, .. } => write!(f, "Unknown (code {code})"),
        }
    }
}

/// Distance travelled, derived from the odometer count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odometer {
    count: u32,
    scale: OdometerScale,
}

impl Odometer {
    #[must_use]
    pub fn count(self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn miles(self) -> f64 {
        f64::from(self.count) * self.scale.miles_per_count()
    }

    #[must_use]
    pub fn kilometres(self) -> f64 {
        self.miles() * KM_PER_MILE
    }
}

impl Display for Odometer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} miles | {:.2} km",
            round_hundredths(self.miles()),
            round_hundredths(self.kilometres())
        )
    }
}

/// Ride modes unlocked on the board.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RideModes {
    names: Vec<&'static str>,
    requested: u8,
}

impl RideModes {
    #[must_use]
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Whether the board reported more modes than the profile table holds.
    #[must_use]
    pub fn truncated(&self) -> bool {
        usize::from(self.requested) > self.names.len()
    }

    /// The first ride-mode index missing from the profile, when truncated.
    #[must_use]
    pub fn gap(&self) -> Option<ProfileGap> {
        if !self.truncated() {
            return None;
        }
        let first_missing = u8::try_from(self.names.len()).unwrap_or(u8::MAX);
        Some(ProfileGap::new(LookupTable::RideMode, first_missing))
    }
}

impl Display for RideModes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(", "))
    }
}

/// Battery capacity derived with the vendor's threshold formula.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BatteryCapacity {
    raw: u32,
}

impl BatteryCapacity {
    #[must_use]
    pub fn raw(self) -> u32 {
        self.raw
    }

    #[must_use]
    pub fn value(self) -> f64 {
        let divisor = if self.raw > CAPACITY_HIGH_THRESHOLD {
            CAPACITY_HIGH_DIVISOR
        } else {
            CAPACITY_LOW_DIVISOR
        };
        f64::from(self.raw) / divisor
    }
}

impl Display for BatteryCapacity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} (heuristic vendor formula)",
            round_hundredths(self.value())
        )
    }
}

/// Decodes the motor-driver firmware text and classifies it.
#[must_use]
pub fn firmware_status(payload: &[u8], profile: &DeviceProfile) -> FirmwareStatus {
    FirmwareStatus::classify(text(payload), &[profile.latest_firmware()])
}

/// Decodes the board model code.
///
/// # Errors
///
/// Returns an error when the payload is empty.
pub fn board_model(payload: &[u8], profile: &DeviceProfile) -> Result<Lookup, DecodeError> {
    let code = byte(payload, 0)?;
    Ok(Lookup::resolve(code, profile.board_model(code)))
}

/// Returns the serial-number suffix of the motor-driver id.
#[must_use]
pub fn serial_number(payload: &[u8]) -> String {
    let id = text(payload);
    let skip = id.chars().count().saturating_sub(SERIAL_NUMBER_LEN);
    id.chars().skip(skip).collect()
}

/// Converts the odometer count using the scale for `model_code`.
///
/// # Errors
///
/// Returns an error when the payload holds fewer than four bytes.
pub fn odometer(
    payload: &[u8],
    model_code: u8,
    profile: &DeviceProfile,
) -> Result<Odometer, DecodeError> {
    Ok(Odometer {
        count: u32_le(payload)?,
        scale: profile.odometer_scale(model_code),
    })
}

/// Lists the first `payload[0]` ride modes of the profile table.
///
/// # Errors
///
/// Returns an error when the payload is empty.
pub fn ride_modes(payload: &[u8], profile: &DeviceProfile) -> Result<RideModes, DecodeError> {
    let requested = byte(payload, 0)?;
    let names: Vec<&'static str> = profile
        .ride_modes()
        .iter()
        .take(usize::from(requested))
        .copied()
        .collect();
    let modes = RideModes { names, requested };
    if modes.truncated() {
        warn!(
            requested,
            available = modes.names.len(),
            "ride-mode count exceeds the profile table"
        );
    }
    Ok(modes)
}

/// Decodes the active ride-mode index.
///
/// # Errors
///
/// Returns an error when the payload is empty.
pub fn current_ride_mode(payload: &[u8], profile: &DeviceProfile) -> Result<Lookup, DecodeError> {
    let index = byte(payload, 0)?;
    Ok(Lookup::resolve(index, profile.ride_mode(index)))
}

/// Resolves a battery model code read from whichever attribute the profile uses.
///
/// # Errors
///
/// Returns an error when the payload is empty.
pub fn battery_model(payload: &[u8], profile: &DeviceProfile) -> Result<Lookup, DecodeError> {
    let code = byte(payload, 0)?;
    Ok(Lookup::resolve(code, profile.battery_model(code)))
}

/// Decodes the three-byte battery firmware version and classifies it.
///
/// # Errors
///
/// Returns an error when the payload holds fewer than three bytes.
pub fn battery_firmware(
    payload: &[u8],
    profile: &DeviceProfile,
) -> Result<FirmwareStatus, DecodeError> {
    let version = format!(
        "v{}.{}.{}",
        byte(payload, 0)?,
        byte(payload, 1)?,
        byte(payload, 2)?
    );
    Ok(FirmwareStatus::classify(
        version,
        profile.good_battery_firmware(),
    ))
}

/// Formats the battery serial as uppercase hexadecimal.
///
/// # Errors
///
/// Returns an error when the payload holds fewer than four bytes.
pub fn battery_serial(payload: &[u8]) -> Result<String, DecodeError> {
    Ok(format!("{:X}", u32_le(payload)?))
}

/// Formats the state of charge as a percentage.
///
/// # Errors
///
/// Returns an error when the payload is empty.
pub fn state_of_charge(payload: &[u8]) -> Result<String, DecodeError> {
    Ok(format!("{}%", byte(payload, 0)?))
}

/// Decodes the raw battery capacity counter.
///
/// # Errors
///
/// Returns an error when the payload holds fewer than four bytes.
pub fn battery_capacity(payload: &[u8]) -> Result<BatteryCapacity, DecodeError> {
    Ok(BatteryCapacity {
        raw: u32_le(payload)?,
    })
}

/// Renders the beams probe result.
#[must_use]
pub fn beams_supported(service_present: bool) -> &'static str {
    if service_present { "Yes" } else { "No" }
}

/// Rounds to two decimals with ties away from zero; `{:.2}` alone rounds ties to even.
fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

fn byte(payload: &[u8], index: usize) -> Result<u8, DecodeError> {
    payload
        .get(index)
        .copied()
        .ok_or(DecodeError::PayloadTooShort {
            expected: index + 1,
            actual: payload.len(),
        })
}

fn u32_le(payload: &[u8]) -> Result<u32, DecodeError> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or(DecodeError::PayloadTooShort {
            expected: 4,
            actual: payload.len(),
        })?;
    Ok(u32::from_le_bytes(bytes))
}
