use std::time::{Duration, Instant};

use clap::Parser;
use clap::error::ErrorKind;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const SCAN: &str = "hci1|00:11:22|Speaker|-65;hci0|AA:BB:CC|Boosted Board 1A2B|-48";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl boardcheck::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(
    args: boardcheck::Args,
    output_format: boardcheck::OutputFormat,
) -> (anyhow::Result<()>, String) {
    let mut output = Vec::new();
    let result = async {
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let hardware_client = match maybe_fake_args {
            Some(fake_args) => boardcheck::fake_hardware_client(fake_args),
            None => boardcheck::real_hardware_client(),
        };
        boardcheck::run_with_clients(
            command,
            &mut output,
            &FakeTerminalClient,
            hardware_client,
            output_format,
        )
        .await
    }
    .await;
    let stdout = String::from_utf8(output).expect("command output should be UTF-8");
    (result, stdout)
}

async fn run_json<const N: usize>(argv: [&str; N]) -> (anyhow::Result<()>, Value) {
    let args = boardcheck::Args::try_parse_from(argv).expect("arguments should parse");
    let (result, stdout) = run_with_parsed_args(args, boardcheck::OutputFormat::Json).await;
    let value = serde_json::from_str(&stdout).expect("stdout should hold one JSON document");
    (result, value)
}

#[tokio::test]
async fn check_command_prints_extended_record_as_json() -> anyhow::Result<()> {
    let (result, record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "check",
        "--name-prefix",
        "Boosted",
    ])
    .await;

    result?;
    assert_eq!(
        json!({
            "status": "Connected to Boosted Board 1A2B",
            "md-model": "Boosted Stealth",
            "md-firmware-version": "v2.7.2 (latest version)",
            "md-serial-number": "123456789",
            "md-odo": "36.13 miles | 58.14 km",
            "md-ride-modes": "Beginner, Eco, Expert, Pro, Hyper",
            "md-current-ride-mode": "Pro",
            "md-beams-supported": "Yes",
            "battery-model": "B2XR",
            "battery-serial-number": "C0FFEE",
            "battery-firmware-version": "v2.5.1 (latest version)",
            "battery-soc": "87%",
            "battery-cap": "1.75 (heuristic vendor formula)",
            "version-tags": {
                "md-firmware-version": "ok",
                "battery-firmware-version": "ok",
            },
        }),
        record
    );
    Ok(())
}

#[tokio::test]
async fn check_command_decodes_legacy_board() -> anyhow::Result<()> {
    let (result, record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-board",
        "legacy",
        "check",
        "--profile",
        "legacy",
        "--name-prefix",
        "Boosted",
    ])
    .await;

    result?;
    assert_eq!(
        json!({
            "status": "Connected to Boosted Board 1A2B",
            "md-model": "Boosted Dual",
            "md-firmware-version": "v2.5.5 (old version)",
            "md-odo": "19.19 miles | 30.89 km",
            "md-ride-modes": "Beginner, Eco, Expert, Pro",
            "md-current-ride-mode": "Eco",
            "battery-model": "B2SR",
            "battery-firmware-version": "v2.5.1 (latest version)",
            "battery-soc": "64%",
            "version-tags": {
                "md-firmware-version": "stale",
                "battery-firmware-version": "ok",
            },
        }),
        record
    );
    Ok(())
}

#[tokio::test]
async fn check_command_surfaces_unknown_codes_from_attribute_overrides() -> anyhow::Result<()> {
    let (result, record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-attribute",
        "motor_driver_model=09",
        "--fake-attribute",
        "ride_mode_count=07",
        "check",
        "--name-prefix",
        "Boosted",
    ])
    .await;

    result?;
    assert_eq!(json!("Unknown (code 9)"), record["md-model"]);
    assert_eq!(
        json!("Beginner, Eco, Expert, Pro, Hyper"),
        record["md-ride-modes"]
    );
    assert_eq!(json!("38.39 miles | 61.78 km"), record["md-odo"]);
    Ok(())
}

#[tokio::test]
async fn check_command_recovers_from_transient_faults() -> anyhow::Result<()> {
    let (result, record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-fault",
        "connect@1",
        "--fake-fault",
        "read:battery_state_of_charge@2",
        "check",
        "--name-prefix",
        "Boosted",
    ])
    .await;

    result?;
    assert_eq!(json!("87%"), record["battery-soc"]);
    Ok(())
}

#[tokio::test]
async fn check_command_fails_after_exhausting_attempts() {
    let (result, record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-fault",
        "connect@1",
        "--fake-fault",
        "discover@2",
        "--fake-fault",
        "read:odometer@3",
        "check",
        "--name-prefix",
        "Boosted",
    ])
    .await;

    let error = result.expect_err("three failed attempts should fail the command");
    assert_eq!("board check failed after 3 attempt(s)", error.to_string());
    assert_eq!(
        json!({"status": "Failed to read data. Try the troubleshooting steps."}),
        record
    );
}

#[tokio::test]
async fn check_command_honours_attempt_budget() {
    let (result, _record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-fault",
        "connect@1",
        "check",
        "--attempts",
        "1",
    ])
    .await;

    let error = result.expect_err("a single failed attempt should fail the command");
    assert_eq!("board check failed after 1 attempt(s)", error.to_string());
}

#[tokio::test]
async fn check_command_reports_cancelled_selection() {
    let args = boardcheck::Args::try_parse_from([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "check",
        "--name-prefix",
        "Skateboard",
    ])
    .expect("arguments should parse");

    let (result, stdout) = run_with_parsed_args(args, boardcheck::OutputFormat::Json).await;
    let error = result.expect_err("no matching board should cancel selection");
    assert_eq!("device selection was cancelled", error.to_string());
    assert_eq!("", stdout);
}

#[tokio::test]
async fn check_command_renders_pretty_table() -> anyhow::Result<()> {
    let fake = boardcheck::FakeArgs::builder()
        .scan_fixture(SCAN)?
        .board(boardcheck::ProfileKind::Legacy)
        .build();
    let args = boardcheck::Args::new(boardcheck::Command::Check(
        boardcheck::CheckArgs::builder()
            .profile(boardcheck::ProfileKind::Legacy)
            .name_prefix("Boosted")
            .build(),
    ))
    .with_fake(fake);

    let (result, stdout) = run_with_parsed_args(args, boardcheck::OutputFormat::Pretty).await;
    result?;

    let mut lines = stdout.lines();
    assert_eq!(Some("Connected to Boosted Board 1A2B"), lines.next());
    assert!(stdout.contains("│ md-model                 │ Boosted Dual"));
    assert!(stdout.contains("│ battery-firmware-version │ v2.5.1 (latest version)"));
    assert!(!stdout.contains("battery-cap"));
    Ok(())
}

#[tokio::test]
async fn check_command_applies_fake_discovery_delay() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let (result, _record) = run_json([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-discovery-delay",
        "40ms",
        "check",
    ])
    .await;

    result?;
    assert!(started_at.elapsed() >= Duration::from_millis(40));
    Ok(())
}

#[tokio::test]
async fn profile_command_prints_json_tables() -> anyhow::Result<()> {
    let (result, report) = run_json(["boardcheck", "profile", "--profile", "legacy"]).await;

    result?;
    assert_eq!(json!("legacy"), report["profile"]);
    assert_eq!(json!("v2.7.2"), report["latest_firmware"]);
    assert_eq!(json!(["v2.5.1"]), report["good_battery_firmware"]);
    assert_eq!(
        json!({
            "motor_driver_serial": false,
            "beams_probe": false,
            "battery_serial": false,
            "battery_capacity": false,
        }),
        report["capabilities"]
    );
    assert_eq!(json!({"code": 2, "name": "B2XR"}), report["battery_models"][1]);
    Ok(())
}

#[tokio::test]
async fn profile_command_renders_pretty_tables() -> anyhow::Result<()> {
    let args = boardcheck::Args::new(boardcheck::Command::Profile(boardcheck::ProfileArgs::new(
        boardcheck::ProfileKind::Extended,
    )));

    let (result, stdout) = run_with_parsed_args(args, boardcheck::OutputFormat::Pretty).await;
    result?;

    assert!(stdout.contains("Board models"));
    assert!(stdout.contains("│ 6    │ Boosted Mini X"));
    assert!(stdout.contains("│ 0    │ UNKNOWN 0"));
    Ok(())
}

#[test]
fn fake_args_reject_invalid_fixture() {
    let result = boardcheck::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(boardcheck::FixtureError::InvalidRecordFieldCount)
    ));
}

#[test]
fn malformed_fault_fails_argument_parsing() {
    let result = boardcheck::Args::try_parse_from([
        "boardcheck",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-fault",
        "explode@1",
        "check",
    ]);

    let error = result.expect_err("unknown fault kinds should fail parsing");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}
