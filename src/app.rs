use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::hw::{
    FakeProbe, HardwareClient, fake_hardware_client as build_fake_hardware_client,
    fake_hardware_client_with_probe as build_fake_hardware_client_with_probe,
    real_hardware_client as build_real_hardware_client,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Creates a fake hardware client together with a probe counting transport calls.
///
/// ```
/// # fn demo() -> anyhow::Result<()> {
/// let fake = boardcheck::FakeArgs::builder()
///     .scan_fixture("hci0|AA:BB:CC|Boosted Board 1A2B|-48")?
///     .build();
/// let (client, probe) = boardcheck::fake_hardware_client_with_probe(fake);
/// assert_eq!(0, probe.connects());
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub fn fake_hardware_client_with_probe(
    fake_args: FakeArgs,
) -> (Box<dyn HardwareClient>, FakeProbe) {
    build_fake_hardware_client_with_probe(fake_args.into_backend_config())
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = boardcheck::Args::try_parse_from([
///     "boardcheck",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|Boosted Board 1A2B|-48",
///     "check",
/// ])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => boardcheck::fake_hardware_client(fake_args),
///     None => boardcheck::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// boardcheck::run(command, &mut out, hardware_client, boardcheck::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, device selection fails,
/// the board check fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, hardware_client, None, output_format).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, device selection fails,
/// the board check fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        hardware_client,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, device selection fails,
/// the board check fails, or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        terminal_client,
        hardware_client,
        None,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl boardcheck::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = boardcheck::Args::try_parse_from([
///     "boardcheck",
///     "--log-level",
///     "trace",
///     "profile",
///     "--profile",
///     "legacy",
/// ])?;
/// let log_level = args.log_level();
/// let (command, _maybe_fake_args) = args.into_command_and_fake_args()?;
/// let mut out = Vec::new();
/// boardcheck::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     boardcheck::real_hardware_client(),
///     log_level,
///     boardcheck::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, device selection fails,
/// the board check fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client),
    level = "info",
    fields(command = %command_name(&command), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "boardcheck",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Check(args) => {
            crate::cli::check::run(
                hardware_client,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Profile(args) => {
            crate::cli::profile::run(args, out, terminal_client, output_format)
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Check(_args) => "check",
        Command::Profile(_args) => "profile",
    }
}
