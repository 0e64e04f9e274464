use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::board::LookupTable;
use crate::protocol::AttributeId;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("the Bluetooth stack is unavailable on this system")]
    BluetoothUnavailable { source: btleplug::Error },
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("device selection was cancelled")]
    SelectionCancelled,
    #[error("no board matching `{prefix}*` was found in the fake fixture")]
    NoMatchingFixtureDevice { prefix: String },
    #[error("service {service} is not exposed by the connected board")]
    ServiceNotFound { service: Uuid },
    #[error("characteristic {characteristic} is not exposed by service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error(
        "attribute handle from connection generation {handle_generation} was used on generation {current_generation}"
    )]
    StaleHandle {
        handle_generation: u64,
        current_generation: u64,
    },
    #[error("read did not complete within {timeout:?}")]
    ReadTimeout { timeout: Duration },
    #[error("the board disconnected")]
    Disconnected,
    #[error("scripted fake fault `{fault}`")]
    ScriptedFault { fault: String },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when a payload cannot be decoded.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("payload holds {actual} byte(s) but at least {expected} are required")]
    PayloadTooShort { expected: usize, actual: usize },
}

/// A code missing from one of the profile lookup tables.
#[derive(Debug, Clone, Copy, Error, Eq, PartialEq)]
pub enum LookupError {
    #[error("{table} code {code} is not in the profile table")]
    UnknownCode { table: LookupTable, code: u8 },
}

/// Reasons a single connect-discover-read attempt failed.
///
/// Every variant is retried by the session controller.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("failed to connect to the board")]
    ConnectFailed(#[source] InteractionError),
    #[error("service discovery failed")]
    DiscoveryFailed(#[source] InteractionError),
    #[error("failed to read `{attribute}`")]
    ReadFailed {
        attribute: AttributeId,
        source: InteractionError,
    },
    #[error("failed to decode `{attribute}`")]
    Decode {
        attribute: AttributeId,
        source: DecodeError,
    },
    #[error("the board disconnected during the attempt")]
    Disconnected,
}

/// Terminal session errors that are never retried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device selection was cancelled")]
    SelectionCancelled { source: InteractionError },
    #[error("the Bluetooth transport is unavailable")]
    TransportUnavailable { source: InteractionError },
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("attribute payloads must look like `attribute=hex`, got `{value}`")]
    InvalidAttributePayload { value: String },
    #[error("unknown attribute `{name}`")]
    UnknownAttribute { name: String },
    #[error("invalid hex payload")]
    InvalidHex(#[from] hex::FromHexError),
    #[error(
        "fault `{value}` must look like `connect@N`, `discover@N` or `read|disconnect|stall:attribute@N`"
    )]
    InvalidFault { value: String },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error("board check failed after {attempts} attempt(s)")]
    CheckFailed { attempts: u32 },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
