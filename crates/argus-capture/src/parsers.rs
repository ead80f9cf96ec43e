//! Payload parsers.
//!
//! One parser per [`ParserKind`], each turning a decoded payload into
//! zero or more normalized events. Parsers never fail: anything they
//! cannot interpret yields an empty result, never an error.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use argus_core::{parse_timestamp, Event, ParserKind, Source};

use crate::decoder::DecodedPayload;

/// Longest query snippet kept in event context.
const QUERY_SNIPPET_LEN: usize = 100;

/// Event name used when a flat event carries none of the known name fields.
const FLAT_EVENT_FALLBACK: &str = "site_event";

const LEGACY_EVENT_FIELDS: [&str; 6] = [
    "event",
    "eventName",
    "event_name",
    "type",
    "action",
    "eventType",
];
const LEGACY_TIME_FIELDS: [&str; 3] = ["timestamp", "time", "sentAt"];

/// Parses a decoded payload with the strategy a source declares.
pub fn parse(kind: ParserKind, payload: &DecodedPayload, source: &Source) -> Vec<Event> {
    match kind {
        ParserKind::Batch => parse_batch(payload),
        ParserKind::Measurement => parse_measurement(payload),
        ParserKind::FlatEvent => parse_flat(payload),
        ParserKind::Graphql => parse_graphql(payload),
        ParserKind::Generic => parse_generic(payload, source),
    }
}

// =============================================================================
// Batch/track envelopes
// =============================================================================

/// Parses `{batch: [...]}` envelopes and single track calls.
///
/// Batch items map independently and keep their input order. An item
/// without a usable `event` or `type` contributes nothing.
fn parse_batch(payload: &DecodedPayload) -> Vec<Event> {
    let Some(data) = payload.to_value() else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(batch) = data.get("batch").and_then(Value::as_array) {
        for item in batch {
            if let Some(event) = track_event(item) {
                events.push(event);
            }
        }
    } else if text_of(data.get("event")).is_some() {
        // Single track call: same shape, no envelope.
        if let Some(event) = track_event(&data) {
            events.push(event);
        }
    }

    events
}

fn track_event(item: &Value) -> Option<Event> {
    if !item.is_object() {
        return None;
    }

    let name = text_of(item.get("event")).or_else(|| text_of(item.get("type")))?;
    let kind = text_of(item.get("type")).unwrap_or_else(|| "track".to_string());

    let mut event = Event::new(name, kind);
    event.timestamp = resolve_timestamp(item, &["timestamp", "sentAt"]);
    event.properties = object_of(item.get("properties"));
    event.context = object_of(item.get("context"));
    event.user_id = text_of(item.get("userId"));
    event.anonymous_id = text_of(item.get("anonymousId"));
    Some(event)
}

// =============================================================================
// Measurement protocol
// =============================================================================

/// Parses measurement-protocol payloads.
///
/// JSON bodies carry an `events` array (the GA4 shape); text bodies are
/// `key=value&...` pairs (the legacy shape) mapped through a fixed
/// parameter table.
fn parse_measurement(payload: &DecodedPayload) -> Vec<Event> {
    if let Some(text) = payload.as_text() {
        if text.contains('&') {
            return parse_measurement_query(text);
        }
        return Vec::new();
    }

    let Some(data) = payload.to_value() else {
        return Vec::new();
    };
    let Some(entries) = data.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };

    let user_id = text_of(data.get("user_id"));
    let client_id = text_of(data.get("client_id"));

    let mut events = Vec::new();
    for entry in entries {
        let Some(name) = text_of(entry.get("name")) else {
            continue;
        };
        let mut event = Event::new(name, "ga4");
        event.properties = object_of(entry.get("params"));
        event.user_id = user_id.clone();
        event.anonymous_id = client_id.clone();
        events.push(event);
    }
    events
}

fn parse_measurement_query(text: &str) -> Vec<Event> {
    let mut params: Map<String, Value> = Map::new();
    for pair in text.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            let key = form_decode(key);
            if !params.contains_key(&key) {
                params.insert(key, Value::String(form_decode(value)));
            }
        }
    }

    let get = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let Some(name) = get("ea").or_else(|| get("t")) else {
        return Vec::new();
    };

    let mut event = Event::new(name, "ua");
    for (param, property) in [("ec", "category"), ("ea", "action"), ("el", "label"), ("ev", "value")] {
        if let Some(value) = get(param) {
            event.properties.insert(property.to_string(), json!(value));
        }
    }
    event.anonymous_id = get("cid");
    vec![event]
}

/// Decodes one `application/x-www-form-urlencoded` token.
fn form_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if c == '+' {
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}

// =============================================================================
// Flat events
// =============================================================================

/// Parses flat event objects, singly or in arrays.
///
/// Every top-level field lands in `properties`; a small set of ambient
/// fields is mirrored into `context`.
fn parse_flat(payload: &DecodedPayload) -> Vec<Event> {
    let Some(data) = payload.to_value() else {
        return Vec::new();
    };

    let items: Vec<&Value> = match &data {
        Value::Array(items) => items.iter().collect(),
        value if value.is_object() => vec![value],
        _ => return Vec::new(),
    };

    let mut events = Vec::new();
    for item in items {
        let Some(fields) = item.as_object() else {
            continue;
        };

        let name = text_of(item.get("action"))
            .or_else(|| text_of(item.get("event")))
            .or_else(|| text_of(item.get("noun")))
            .unwrap_or_else(|| FLAT_EVENT_FALLBACK.to_string());

        let mut event = Event::new(name, "track");
        event.timestamp = resolve_timestamp(item, &["client_timestamp", "timestamp"]);
        event.properties = fields.clone();
        for key in ["user_agent", "screen", "viewport"] {
            if let Some(value) = fields.get(key) {
                if !value.is_null() {
                    event.context.insert(key.to_string(), value.clone());
                }
            }
        }
        events.push(event);
    }
    events
}

// =============================================================================
// GraphQL envelopes
// =============================================================================

/// Parses GraphQL envelopes that smuggle analytics in their variables.
///
/// Requires both a query string and variables. Only a truncated query
/// snippet is kept; the full query never reaches the event.
fn parse_graphql(payload: &DecodedPayload) -> Vec<Event> {
    let Some(data) = payload.to_value() else {
        return Vec::new();
    };

    let query = data
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.is_empty());
    let variables = data.get("variables").filter(|v| !v.is_null());
    let (Some(query), Some(variables)) = (query, variables) else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(mut event) = graphql_event(variables, "graphql") {
        let snippet: String = query.chars().take(QUERY_SNIPPET_LEN).collect();
        event
            .context
            .insert("query".to_string(), json!(format!("{snippet}...")));
        events.push(event);
    }

    if let Some(batch) = data.get("batch").and_then(Value::as_array) {
        for op in batch {
            let Some(vars) = op.get("variables").filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(event) = graphql_event(vars, "graphql-batch") {
                events.push(event);
            }
        }
    }

    events
}

fn graphql_event(variables: &Value, kind: &str) -> Option<Event> {
    let name = text_of(variables.get("event")).or_else(|| text_of(variables.get("eventName")))?;

    let mut event = Event::new(name, kind);
    event.timestamp = variables
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);
    event.properties = ["properties", "data"]
        .iter()
        .find_map(|key| variables.get(key).filter(|v| !v.is_null()))
        .map(|v| object_of(Some(v)))
        .unwrap_or_default();
    Some(event)
}

// =============================================================================
// Generic/field-mapped
// =============================================================================

/// Parses by the source's field mappings, or a legacy field scan without
/// them.
///
/// An event is emitted only when an event name resolves.
fn parse_generic(payload: &DecodedPayload, source: &Source) -> Vec<Event> {
    let Some(data) = payload.to_value() else {
        return Vec::new();
    };
    if !data.is_object() {
        return Vec::new();
    }

    if !source.field_mappings.is_empty() {
        let extracted = source.field_mappings.extract(&data);
        let Some(name) = text_of(extracted.event_name.as_ref()) else {
            return Vec::new();
        };

        let mut event = Event::new(name, "custom");
        event.timestamp = extracted
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        event.properties = match &extracted.properties {
            Some(value) => object_of(Some(value)),
            None => object_of(Some(&data)),
        };
        event.user_id = text_of(extracted.user_id.as_ref());
        return vec![event];
    }

    let hit = LEGACY_EVENT_FIELDS
        .iter()
        .find_map(|field| text_of(data.get(field)).map(|name| (*field, name)));
    let Some((field, name)) = hit else {
        return Vec::new();
    };

    let mut event = Event::new(name, "custom");
    event.timestamp = resolve_timestamp(&data, &LEGACY_TIME_FIELDS);
    if let Some(fields) = data.as_object() {
        for (key, value) in fields {
            if key != field && !LEGACY_TIME_FIELDS.contains(&key.as_str()) {
                event.properties.insert(key.clone(), value.clone());
            }
        }
    }
    vec![event]
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Coerces a field into usable text: non-empty strings and numbers only.
fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Clones a field as an object map; anything else is an empty map.
fn object_of(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Resolves a timestamp from the first parseable candidate field.
fn resolve_timestamp(item: &Value, fields: &[&str]) -> DateTime<Utc> {
    fields
        .iter()
        .find_map(|field| item.get(field).and_then(parse_timestamp))
        .unwrap_or_else(Utc::now)
}
