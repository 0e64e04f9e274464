use std::fmt::{self, Display, Formatter};

use crate::cli::profile::{CodeEntry, ProfileReport};

use super::painter::Painter;
use super::table::Table;

/// Renders a profile report as a summary table followed by its lookup tables.
pub(crate) struct ProfileView<'a> {
    report: &'a ProfileReport,
    painter: &'a Painter,
}

impl<'a> ProfileView<'a> {
    pub(crate) fn new(report: &'a ProfileReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn yes_no(&self, enabled: bool) -> String {
        if enabled {
            self.painter.success("yes")
        } else {
            self.painter.muted("no")
        }
    }

    fn summary(&self) -> Table {
        let report = self.report;
        let capabilities = report.capabilities;
        let value = |text: String| self.painter.value(text);

        Table::key_value(
            self.painter,
            vec![
                ("profile".into(), value(report.profile.to_string())),
                ("latest firmware".into(), value(report.latest_firmware.into())),
                (
                    "good battery firmware".into(),
                    value(report.good_battery_firmware.join(", ")),
                ),
                (
                    "battery model source".into(),
                    value(report.battery_model_source.to_string()),
                ),
                (
                    "motor driver serial".into(),
                    self.yes_no(capabilities.motor_driver_serial),
                ),
                ("beams probe".into(), self.yes_no(capabilities.beams_probe)),
                ("battery serial".into(), self.yes_no(capabilities.battery_serial)),
                (
                    "battery capacity".into(),
                    self.yes_no(capabilities.battery_capacity),
                ),
            ],
        )
    }
}

fn code_table(entries: &[CodeEntry]) -> Table {
    let rows = entries
        .iter()
        .map(|entry| vec![entry.code.to_string(), entry.name.to_string()])
        .collect();
    Table::grid(["code", "name"], rows)
}

impl Display for ProfileView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        let sections = [
            ("Board models", &self.report.board_models),
            ("Ride modes", &self.report.ride_modes),
            ("Battery models", &self.report.battery_models),
        ];
        for (index, (title, entries)) in sections.into_iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", self.painter.heading(title))?;
            write!(f, "{}", code_table(entries))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::board::{DeviceProfile, ProfileKind};

    #[test]
    fn legacy_battery_models_render_as_code_table() {
        let report = ProfileReport::from(DeviceProfile::for_kind(ProfileKind::Legacy));
        assert_snapshot!(code_table(&report.battery_models).to_string(), @r"
        ╭──────┬──────╮
        │ code │ name │
        ├──────┼──────┤
        │ 1    │ B2SR │
        │ 2    │ B2XR │
        ╰──────┴──────╯
        ");
    }

    #[test]
    fn profile_view_shows_capabilities_and_tables() {
        let report = ProfileReport::from(DeviceProfile::for_kind(ProfileKind::Extended));
        let painter = Painter::new(false);
        let rendered = ProfileView::new(&report, &painter).to_string();

        assert!(rendered.contains("│ profile               │ extended"));
        assert!(rendered.contains("battery firmware major version"));
        assert!(rendered.contains("v2.5.1, v1.6.3"));
        assert!(rendered.contains("Ride modes"));
        assert!(rendered.contains("│ 7    │ Boosted Rev"));
    }
}
