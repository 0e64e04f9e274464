mod app;
mod board;
mod cli;
mod error;
mod hw;
mod protocol;
mod session;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    fake_hardware_client, fake_hardware_client_with_probe, real_hardware_client, run,
    run_with_clients, run_with_clients_and_log_level, run_with_log_level,
};
pub use board::decode;
pub use board::{
    BatteryCapacity, BatteryModelSource, Capabilities, DecodedRecord, DeviceProfile,
    FirmwareStatus, Lookup, LookupTable, Odometer, OdometerScale, ProfileGap, ProfileKind,
    RecordKey, RideModes, VERSION_TAGS_KEY, VersionClass,
};
pub use cli::{Args, CheckArgs, Command, FakeArgs, LogLevel, OutputFormat, ProfileArgs};
pub use error::{
    AttemptError, DecodeError, FixtureError, InteractionError, LookupError, SessionError,
};
pub use hw::{
    AttributeCache, AttributePayload, BoardLink, CharacteristicHandle, DeviceSelection,
    FakeFault, FakeProbe, FoundDevice, HardwareClient, LinkState, ScanFixture, ServiceHandle,
};
pub use protocol::{AttributeAddress, AttributeId, ServiceId};
pub use session::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_READ_TIMEOUT, ResultSink, SessionConfig, SessionController,
    SessionOutcome, SessionState, Subsystem,
};
pub use terminal::{SystemTerminalClient, TerminalClient};
