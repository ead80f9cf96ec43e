//! API request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use argus_core::{Event, ParserKind, Source};
use argus_storage::{EventFilter, Settings};

use crate::error::{ApiError, Result};

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Query parameters for GET /api/events and the export endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Substring of the event name.
    pub event: Option<String>,
    /// Parser strategy name (`batch`, `measurement`, ...).
    pub parser: Option<String>,
    /// Substring of the capture URL.
    pub url: Option<String>,
    /// Inclusive lower timestamp bound.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound.
    pub end_time: Option<DateTime<Utc>>,
    /// Full-text search term.
    pub search: Option<String>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl EventsQuery {
    /// Converts the query into a store filter.
    pub fn into_filter(self) -> Result<EventFilter> {
        let parser = match self.parser {
            Some(name) => Some(
                ParserKind::parse(&name)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown parser: {name}")))?,
            ),
            None => None,
        };

        Ok(EventFilter {
            event: self.event,
            parser,
            url: self.url,
            start_time: self.start_time,
            end_time: self.end_time,
            search: self.search,
            limit: self.limit,
        })
    }
}

/// Response body for GET /api/events.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// Matching events, newest first.
    pub events: Vec<Event>,
    /// Total number of stored events, ignoring the filter.
    pub total: usize,
}

/// Response body for POST /api/capture.
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    /// How many events the request produced.
    pub captured: usize,
}

/// Request body for POST /api/events.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Response body for POST /api/events.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// How many events were new.
    pub added: usize,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response body for GET /api/sources.
#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    /// Registered sources in matching order.
    pub sources: Vec<Source>,
    /// The catch-all source, when one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Source>,
}

/// Request body for POST /api/sources/import.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// A JSON array of source definitions, as produced by the export.
    pub data: String,
}

/// Response body for POST /api/sources/import.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
}

/// Request body for POST /api/sources/sample.
#[derive(Debug, Deserialize)]
pub struct SampleRequest {
    /// URL of the sampled request.
    pub url: String,
    /// Decoded payload of the sampled request.
    pub payload: Value,
}

/// Request body for PUT /api/settings. Unset fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub persist_events: Option<bool>,
    pub max_events: Option<usize>,
}

impl SettingsUpdate {
    /// Merges the update over the current settings.
    pub fn apply_to(self, mut settings: Settings) -> Settings {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(persist) = self.persist_events {
            settings.persist_events = persist;
        }
        if let Some(max) = self.max_events {
            settings.max_events = max;
        }
        settings
    }
}
