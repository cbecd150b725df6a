//! Record Output

use crate::settings::OutputFormat;
use aldl_protocol::{hex_string, CommDefinition};
use record_buffer::Record;
use serde_json::{json, Map, Value};
use std::fmt::Write;

/// Render one record as a single line
pub fn format_record(record: &Record, definition: &CommDefinition, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json_line(record, definition),
        OutputFormat::Hex => hex_line(record, definition),
    }
}

fn json_line(record: &Record, definition: &CommDefinition) -> String {
    let packets: Map<String, Value> = definition
        .packets()
        .iter()
        .zip(&record.packets)
        .map(|(def, snapshot)| {
            let value = json!({
                "clean": snapshot.clean,
                "data": hex_string(&snapshot.data),
            });
            (def.name().to_string(), value)
        })
        .collect();

    json!({
        "sequence": record.sequence,
        "timestamp_ms": record.timestamp_ms,
        "clean": record.is_clean(),
        "packets": packets,
    })
    .to_string()
}

fn hex_line(record: &Record, definition: &CommDefinition) -> String {
    let mut line = format!("#{} @{}", record.sequence, record.timestamp_ms);
    for (def, snapshot) in definition.packets().iter().zip(&record.packets) {
        let mark = if snapshot.clean { "" } else { "!" };
        let _ = write!(line, " {}{}=[{}]", mark, def.name(), hex_string(&snapshot.data));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use aldl_protocol::{CommConfig, PacketConfig};
    use record_buffer::PacketSnapshot;

    fn fixture() -> (Record, CommDefinition) {
        let definition = CommDefinition::new(CommConfig {
            packets: vec![
                PacketConfig::new("engine", 0x00, 4),
                PacketConfig::new("trans", 0x01, 3),
            ],
            ..Default::default()
        })
        .unwrap();
        let record = Record {
            sequence: 7,
            timestamp_ms: 1_000,
            packets: vec![
                PacketSnapshot {
                    data: vec![0xF4, 0x57, 0x01, 0xB4],
                    clean: true,
                },
                PacketSnapshot {
                    data: vec![0x00, 0x00, 0x00],
                    clean: false,
                },
            ],
        };
        (record, definition)
    }

    #[test]
    fn test_json_line() {
        let (record, definition) = fixture();
        let line = format_record(&record, &definition, OutputFormat::Json);
        let value: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["sequence"], 7);
        assert_eq!(value["clean"], false);
        assert_eq!(value["packets"]["engine"]["data"], "F4 57 01 B4");
        assert_eq!(value["packets"]["trans"]["clean"], false);
    }

    #[test]
    fn test_hex_line_marks_dirty_packets() {
        let (record, definition) = fixture();
        assert_eq!(
            format_record(&record, &definition, OutputFormat::Hex),
            "#7 @1000 engine=[F4 57 01 B4] !trans=[00 00 00]"
        );
    }
}
