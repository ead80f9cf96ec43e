//! Event export formats.

use chrono::SecondsFormat;
use serde_json::Value;

use argus_core::Event;

/// CSV column order. Fixed; consumers key on positions.
const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Timestamp",
    "Event",
    "Type",
    "Parser",
    "URL",
    "Properties",
    "User ID",
    "Anonymous ID",
];

/// Renders events as a pretty-printed JSON array.
pub fn export_json(events: &[Event]) -> String {
    serde_json::to_string_pretty(events).unwrap_or_else(|_| "[]".to_string())
}

/// Renders events as CSV with a fixed column set.
///
/// An empty input renders as an empty string, not a lone header row.
/// Every data cell is quoted, with embedded quotes doubled.
pub fn export_csv(events: &[Event]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(events.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for event in events {
        let properties = serde_json::to_string(&Value::Object(event.properties.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        let cells = [
            event.id.clone(),
            event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            event.event_name.clone(),
            event.kind.clone(),
            event.capture_metadata.parser_kind.as_str().to_string(),
            event.capture_metadata.url.clone(),
            properties,
            event.user_id.clone().unwrap_or_default(),
            event.anonymous_id.clone().unwrap_or_default(),
        ];

        let row: Vec<String> = cells.iter().map(|cell| quote(cell)).collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}
