use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::board::ProfileKind;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    AttributePayload, DEFAULT_SELECTION_TIMEOUT, DeviceSelection, FakeBackendConfig, FakeFault,
    ScanFixture,
};
use crate::session::{DEFAULT_MAX_ATTEMPTS, DEFAULT_READ_TIMEOUT, SessionConfig};

/// Command-line options for the board telemetry reader.
#[derive(Debug, Parser)]
#[command(
    name = "boardcheck",
    about = "Read firmware, odometer and battery telemetry from Boosted boards over BLE."
)]
pub struct Args {
    /// Overrides `RUST_LOG` with a single log level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Preset payload table the fake board answers with.
    #[arg(long, global = true, requires = "fake", value_enum)]
    fake_board: Option<ProfileKind>,
    /// Overrides one fake attribute payload, e.g. `odometer=40420f00`. Repeatable.
    #[arg(long = "fake-attribute", global = true, requires = "fake")]
    fake_attributes: Vec<AttributePayload>,
    /// Injects a scripted failure, e.g. `connect@1` or `disconnect:odometer@2`. Repeatable.
    #[arg(long = "fake-fault", global = true, requires = "fake")]
    fake_faults: Vec<FakeFault>,
    /// Hides the beams service on the fake board.
    #[arg(long, global = true, requires = "fake")]
    fake_missing_beams: bool,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use boardcheck::{Args, CheckArgs, Command};
    ///
    /// let args = Args::new(Command::Check(CheckArgs::builder().build()));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            fake: false,
            fake_scan: None,
            fake_board: None,
            fake_attributes: Vec::new(),
            fake_faults: Vec::new(),
            fake_missing_beams: false,
            fake_discovery_delay: None,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            board,
            attributes,
            faults,
            missing_beams,
            discovery_delay,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_board = Some(board);
        self.fake_attributes = attributes;
        self.fake_faults = faults;
        self.fake_missing_beams = missing_beams;
        self.fake_discovery_delay = Some(discovery_delay);
        self
    }

    /// Explicit log level, if one was given.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Explicit output format, if one was given.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_board,
            fake_attributes,
            fake_faults,
            fake_missing_beams,
            fake_discovery_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                board: fake_board.unwrap_or_default(),
                attributes: fake_attributes,
                faults: fake_faults,
                missing_beams: fake_missing_beams,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    Pretty,
    /// Machine-readable JSON.
    Json,
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(default)]
    board: ProfileKind,
    #[builder(default)]
    attributes: Vec<AttributePayload>,
    #[builder(default)]
    faults: Vec<FakeFault>,
    #[builder(default)]
    missing_beams: bool,
    #[builder(default)]
    discovery_delay: Duration,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            board,
            attributes,
            faults,
            missing_beams,
            discovery_delay,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .board(board)
            .attribute_overrides(attributes)
            .faults(faults)
            .omit_beams(missing_beams)
            .discovery_delay(discovery_delay)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select the first matching board, read every subsystem once, and print the record.
    Check(CheckArgs),
    /// Print the lookup tables and capabilities of a device profile.
    Profile(ProfileArgs),
}

/// Options for the `check` command.
#[derive(Debug, Clone, clap::Args, Builder)]
pub struct CheckArgs {
    /// Protocol revision used to decode the board.
    #[arg(long, value_enum, default_value_t)]
    #[builder(default)]
    profile: ProfileKind,
    /// Only select boards whose advertised name starts with this prefix.
    #[arg(long)]
    #[builder(into)]
    name_prefix: Option<String>,
    /// Connection attempts before giving up.
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    attempts: u32,
    /// Upper bound on each characteristic read (e.g. `5s`).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    #[builder(default = DEFAULT_READ_TIMEOUT)]
    read_timeout: Duration,
    /// How long to scan for a matching board (e.g. `30s`).
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    #[builder(default = DEFAULT_SELECTION_TIMEOUT)]
    scan_timeout: Duration,
}

impl CheckArgs {
    #[must_use]
    pub fn profile(&self) -> ProfileKind {
        self.profile
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        let selection = DeviceSelection::builder()
            .maybe_name_prefix(self.name_prefix.clone())
            .timeout(self.scan_timeout)
            .build();
        SessionConfig::builder()
            .profile(self.profile)
            .max_attempts(self.attempts)
            .read_timeout(self.read_timeout)
            .selection(selection)
            .build()
    }
}

/// Options for the `profile` command.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct ProfileArgs {
    /// Profile to print.
    #[arg(long, value_enum, default_value_t)]
    profile: ProfileKind,
}

impl ProfileArgs {
    #[must_use]
    pub fn new(profile: ProfileKind) -> Self {
        Self { profile }
    }

    #[must_use]
    pub fn profile(&self) -> ProfileKind {
        self.profile
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
