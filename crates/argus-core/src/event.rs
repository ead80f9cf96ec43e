//! Normalized analytics events.
//!
//! Every parser strategy produces [`Event`] values in this one shape, so
//! storage, filtering, and export never care which analytics provider a
//! payload came from.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::source::ParserKind;

/// How an event was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureMetadata {
    /// When the capture pipeline saw the request.
    pub captured_at: DateTime<Utc>,
    /// The request URL the event was extracted from.
    pub url: String,
    /// Page or script that initiated the request, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    /// Parser strategy that produced the event.
    pub parser_kind: ParserKind,
}

impl Default for CaptureMetadata {
    fn default() -> Self {
        Self {
            captured_at: Utc::now(),
            url: String::new(),
            initiator: None,
            parser_kind: ParserKind::default(),
        }
    }
}

/// A single normalized analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique capture-side identifier.
    pub id: String,
    /// Event timestamp, from the payload when parseable.
    pub timestamp: DateTime<Utc>,
    /// Normalized event name.
    pub event_name: String,
    /// Provider-level classification ("track", "ga4", "custom", ...).
    pub kind: String,
    /// Event properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Ambient context (user agent, screen, query snippets, ...).
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Identified user id, when present in the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Anonymous/device id, when present in the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    /// Id of the source that matched the request.
    #[serde(default)]
    pub source_id: String,
    /// Display name of the source that matched the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Capture-side metadata.
    #[serde(default)]
    pub capture_metadata: CaptureMetadata,
}

impl Event {
    /// Creates an event with a fresh id and the current time.
    pub fn new(event_name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            timestamp: Utc::now(),
            event_name: event_name.into(),
            kind: kind.into(),
            properties: Map::new(),
            context: Map::new(),
            user_id: None,
            anonymous_id: None,
            source_id: String::new(),
            source_name: None,
            capture_metadata: CaptureMetadata::default(),
        }
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

/// Generates a capture-side event id: epoch millis plus a random suffix.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Interprets a JSON value as a timestamp.
///
/// Strings are tried as RFC 3339, then as a few common naive formats read
/// as UTC. Numbers at or above `1e12` are epoch milliseconds, below that
/// epoch seconds. Anything else yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            None
        }
        Value::Number(n) => {
            let n = n.as_f64()?;
            if !n.is_finite() {
                return None;
            }
            if n >= 1e12 {
                DateTime::from_timestamp_millis(n as i64)
            } else {
                DateTime::from_timestamp(n as i64, 0)
            }
        }
        _ => None,
    }
}
