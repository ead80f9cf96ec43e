//! Request body decoding.
//!
//! Capture clients deliver bodies in three shapes: already-structured
//! JSON, a form-field map, or a list of raw byte chunks. Decoding never
//! fails; bytes that are not JSON degrade to raw text and a missing body
//! decodes to [`DecodedPayload::Empty`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw byte chunk of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChunk {
    #[serde(default)]
    pub bytes: Vec<u8>,
}

/// Request body as submitted by a capture client.
///
/// Untagged: the form and raw wrappers are recognized by their keys,
/// anything else is treated as structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureBody {
    /// Form submission: field name to list of values.
    Form {
        #[serde(rename = "formData")]
        form_data: HashMap<String, Vec<String>>,
    },
    /// Raw byte chunks.
    Raw { raw: Vec<RawChunk> },
    /// Already-structured JSON.
    Structured(Value),
}

/// Result of decoding a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// Structured JSON, either passed through or parsed from bytes.
    Json(Value),
    /// Bytes that decoded to text but not to JSON.
    RawText(String),
    /// Form fields, first value per field.
    Form(BTreeMap<String, String>),
    /// No usable body.
    Empty,
}

impl DecodedPayload {
    /// Views the payload as a JSON value, when it has one.
    ///
    /// Form fields become an object of strings so parsers can treat form
    /// submissions like any other flat payload.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            DecodedPayload::Json(value) => Some(value.clone()),
            DecodedPayload::Form(fields) => {
                let map: Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Some(Value::Object(map))
            }
            DecodedPayload::RawText(_) | DecodedPayload::Empty => None,
        }
    }

    /// Views the payload as text, when it decoded to text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedPayload::RawText(text) => Some(text),
            _ => None,
        }
    }
}

/// Decodes an optional request body. Never fails.
pub fn decode(body: Option<&CaptureBody>) -> DecodedPayload {
    let Some(body) = body else {
        return DecodedPayload::Empty;
    };

    match body {
        CaptureBody::Form { form_data } => {
            let fields: BTreeMap<String, String> = form_data
                .iter()
                .filter_map(|(key, values)| {
                    values.first().map(|v| (key.clone(), v.clone()))
                })
                .collect();
            DecodedPayload::Form(fields)
        }
        CaptureBody::Raw { raw } => {
            if raw.is_empty() {
                return DecodedPayload::Empty;
            }
            let bytes: Vec<u8> = raw.iter().flat_map(|chunk| chunk.bytes.iter().copied()).collect();
            let text = String::from_utf8_lossy(&bytes).into_owned();
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => DecodedPayload::Json(value),
                Err(_) => DecodedPayload::RawText(text),
            }
        }
        CaptureBody::Structured(Value::Null) => DecodedPayload::Empty,
        CaptureBody::Structured(value) => DecodedPayload::Json(value.clone()),
    }
}
