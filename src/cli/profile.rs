use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::board::{BatteryModelSource, Capabilities, DeviceProfile, ProfileKind};
use crate::cli::{OutputFormat, ProfileArgs};
use crate::terminal::TerminalClient;

use super::ui::{Painter, ProfileView};

/// Lookup tables and capabilities of one profile, as printed by `profile`.
#[derive(Debug, Serialize)]
pub(crate) struct ProfileReport {
    pub(crate) profile: ProfileKind,
    pub(crate) latest_firmware: &'static str,
    pub(crate) good_battery_firmware: &'static [&'static str],
    pub(crate) battery_model_source: BatteryModelSource,
    pub(crate) capabilities: Capabilities,
    pub(crate) board_models: Vec<CodeEntry>,
    pub(crate) ride_modes: Vec<CodeEntry>,
    pub(crate) battery_models: Vec<CodeEntry>,
    pub(crate) record_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CodeEntry {
    pub(crate) code: u8,
    pub(crate) name: &'static str,
}

impl From<&DeviceProfile> for ProfileReport {
    fn from(profile: &DeviceProfile) -> Self {
        let entries = |table: &'static [(u8, &'static str)]| -> Vec<CodeEntry> {
            table
                .iter()
                .map(|&(code, name)| CodeEntry { code, name })
                .collect()
        };

        Self {
            profile: profile.kind(),
            latest_firmware: profile.latest_firmware(),
            good_battery_firmware: profile.good_battery_firmware(),
            battery_model_source: profile.battery_model_source(),
            capabilities: profile.capabilities(),
            board_models: entries(profile.board_models()),
            ride_modes: (0u8..)
                .zip(profile.ride_modes())
                .map(|(code, &name)| CodeEntry { code, name })
                .collect(),
            battery_models: entries(profile.battery_models()),
            record_keys: profile.record_keys().map(|key| key.to_string()).collect(),
        }
    }
}

/// Executes the `profile` command.
#[instrument(
    skip(args, out, terminal_client),
    level = "debug",
    fields(profile = %args.profile(), ?output_format)
)]
pub(crate) fn run<W>(
    args: ProfileArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let report = ProfileReport::from(DeviceProfile::for_kind(args.profile()));

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ProfileView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn legacy_report_serialises_tables_and_capabilities() {
        let report = ProfileReport::from(DeviceProfile::for_kind(ProfileKind::Legacy));
        let value = serde_json::to_value(&report).expect("report should serialise");

        assert_eq!(json!("legacy"), value["profile"]);
        assert_eq!(json!("battery model attribute"), value["battery_model_source"]);
        assert_eq!(json!(false), value["capabilities"]["beams_probe"]);
        assert_eq!(json!({"code": 4, "name": "Boosted Stealth"}), value["board_models"][3]);
        assert_eq!(json!({"code": 4, "name": "Hyper"}), value["ride_modes"][4]);
        assert_eq!(5, report.board_models.len());
    }

    #[test]
    fn extended_report_lists_every_record_key() {
        let report = ProfileReport::from(DeviceProfile::for_kind(ProfileKind::Extended));
        assert_eq!(13, report.record_keys.len());
        assert_eq!(7, report.board_models.len());
        assert_eq!(&["v2.5.1", "v1.6.3"], report.good_battery_firmware);
    }
}
