use std::fmt::{self, Display, Formatter};

use crate::board::{DecodedRecord, RecordKey};

use super::painter::Painter;
use super::table::Table;

/// Renders a decoded record as a status line, a field table and any profile gaps.
pub(crate) struct RecordView<'a> {
    record: &'a DecodedRecord,
    painter: &'a Painter,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(record: &'a DecodedRecord, painter: &'a Painter) -> Self {
        Self { record, painter }
    }

    fn field_value(&self, key: RecordKey, value: &str) -> String {
        match self.record.class(key) {
            Some(class) => self.painter.version(value, class),
            None => self.painter.value(value),
        }
    }
}

impl Display for RecordView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.record.get(RecordKey::Status) {
            writeln!(f, "{}", self.painter.heading(status))?;
        }

        let rows = self
            .record
            .iter()
            .filter(|(key, _value)| *key != RecordKey::Status)
            .map(|(key, value)| (key.to_string(), self.field_value(key, value)))
            .collect();
        write!(f, "{}", Table::key_value(self.painter, rows))?;

        for gap in self.record.gaps() {
            write!(f, "\n{}", self.painter.muted(format!("note: {gap}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::board::{DeviceProfile, ProfileKind, decode};

    fn legacy_record() -> DecodedRecord {
        let profile = DeviceProfile::for_kind(ProfileKind::Legacy);
        let mut record = DecodedRecord::status("Connected to Boosted Board 1A2B");
        record.insert_firmware(
            RecordKey::MdFirmwareVersion,
            &decode::firmware_status(b"v2.5.5", profile),
        );
        let model = decode::board_model(&[9], profile).expect("one byte is enough");
        record.insert(RecordKey::MdModel, model.to_string());
        if let Some(gap) = model.gap() {
            record.note_gap(gap);
        }
        record.insert(RecordKey::BatterySoc, "64%");
        record
    }

    #[test]
    fn record_view_lists_fields_and_gaps() {
        let record = legacy_record();
        let painter = Painter::new(false);

        assert_snapshot!(RecordView::new(&record, &painter).to_string(), @r"
        Connected to Boosted Board 1A2B
        ╭─────────────────────┬──────────────────────╮
        │ field               │ value                │
        ├─────────────────────┼──────────────────────┤
        │ md-model            │ Unknown (code 9)     │
        │ md-firmware-version │ v2.5.5 (old version) │
        │ battery-soc         │ 64%                  │
        ╰─────────────────────┴──────────────────────╯
        note: board model code 9 has no profile entry
        ");
    }

    #[test]
    fn coloured_view_keeps_field_text() {
        let record = legacy_record();
        let painter = Painter::new(true);
        let rendered = RecordView::new(&record, &painter).to_string();

        assert!(rendered.contains("v2.5.5 (old version)"));
        assert!(rendered.contains("Unknown (code 9)"));
    }
}
