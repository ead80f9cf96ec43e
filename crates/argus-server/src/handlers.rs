//! API route handlers.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use argus_capture::CaptureRequest;
use argus_core::{RegistryStats, Source};
use argus_storage::{Settings, StoreSize, StoreStats};

use crate::error::{ApiError, Result};
use crate::models::{
    CaptureResponse, EventsQuery, EventsResponse, HealthResponse, ImportRequest, ImportResponse,
    IngestRequest, IngestResponse, SampleRequest, SettingsUpdate, SourcesResponse, SuccessResponse,
};
use crate::state::AppState;

/// GET /health - Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Capture
// =============================================================================

/// POST /api/capture - Run one observed request through the pipeline.
pub async fn capture(
    State(state): State<AppState>,
    Json(request): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>> {
    debug!(url = %request.url, method = %request.method, "capture request");
    let captured = state.coordinator.handle_request(&request);
    Ok(Json(CaptureResponse { captured }))
}

// =============================================================================
// Events
// =============================================================================

/// GET /api/events - List stored events, newest first.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let filter = query.into_filter()?;
    let events = state.coordinator.events(&filter);
    let total = state.coordinator.store_size().current;
    Ok(Json(EventsResponse { events, total }))
}

/// POST /api/events - Ingest externally collected events.
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>> {
    let added = state.coordinator.merge_events(request.events);
    info!(added, "ingested events");
    Ok(Json(IngestResponse { added }))
}

/// DELETE /api/events - Drop stored events and the persisted copy.
pub async fn clear_events(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    let success = state.coordinator.clear_all();

    // The collector keeps its own backlog; drop that too so cleared
    // events do not reappear on the next poll.
    if let Some(poller) = state.poller.clone() {
        tokio::spawn(async move {
            poller.clear_remote().await;
        });
    }

    info!("cleared events");
    Ok(Json(SuccessResponse { success }))
}

/// POST /api/events/save - Persist the current store contents.
pub async fn save_events(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    Ok(Json(SuccessResponse {
        success: state.coordinator.save_events(),
    }))
}

/// POST /api/events/load - Replace the store with the persisted copy.
pub async fn load_events(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    Ok(Json(SuccessResponse {
        success: state.coordinator.load_persisted_events(),
    }))
}

/// GET /api/events/{id} - Fetch a single event.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<argus_core::Event>> {
    state
        .coordinator
        .event(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("event {id}")))
}

/// GET /api/stats - Aggregate statistics over stored events.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StoreStats>> {
    Ok(Json(state.coordinator.store_stats()))
}

/// GET /api/size - Store occupancy.
pub async fn get_size(State(state): State<AppState>) -> Result<Json<StoreSize>> {
    Ok(Json(state.coordinator.store_size()))
}

// =============================================================================
// Export
// =============================================================================

/// GET /api/export/json - Export filtered events as JSON.
pub async fn export_json(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response> {
    let filter = query.into_filter()?;
    let body = state.coordinator.export_events_json(&filter);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"argus-events.json\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /api/export/csv - Export filtered events as CSV.
pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response> {
    let filter = query.into_filter()?;
    let body = state.coordinator.export_events_csv(&filter);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"argus-events.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

// =============================================================================
// Sources
// =============================================================================

/// GET /api/sources - List sources and the fallback.
pub async fn get_sources(State(state): State<AppState>) -> Result<Json<SourcesResponse>> {
    Ok(Json(SourcesResponse {
        sources: state.coordinator.list_sources(),
        fallback: state.coordinator.fallback_source(),
    }))
}

/// POST /api/sources - Create or replace a source.
pub async fn create_source(
    State(state): State<AppState>,
    Json(source): Json<Source>,
) -> Result<Json<Source>> {
    validate_source(&source)?;
    state.coordinator.upsert_source(source.clone());
    info!(source = %source.id, "source saved");
    Ok(Json(source))
}

/// GET /api/sources/{id} - Fetch a single source.
pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Source>> {
    state
        .coordinator
        .get_source(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("source {id}")))
}

/// PUT /api/sources/{id} - Update a source in place.
pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut source): Json<Source>,
) -> Result<Json<Source>> {
    if source.id.is_empty() {
        source.id = id.clone();
    }
    if source.id != id {
        return Err(ApiError::BadRequest(format!(
            "source id '{}' does not match path '{id}'",
            source.id
        )));
    }
    validate_source(&source)?;
    state.coordinator.upsert_source(source.clone());
    info!(source = %id, "source updated");
    Ok(Json(source))
}

/// DELETE /api/sources/{id} - Remove a source.
pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    if !state.coordinator.remove_source(&id) {
        return Err(ApiError::NotFound(format!("source {id}")));
    }
    info!(source = %id, "source removed");
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/sources/export - Export user-created sources as JSON.
pub async fn export_sources(State(state): State<AppState>) -> Result<Response> {
    let body = state.coordinator.export_sources();
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"argus-sources.json\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /api/sources/import - Import previously exported sources.
pub async fn import_sources(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>> {
    let imported = state.coordinator.import_sources(&request.data)?;
    info!(imported, "sources imported");
    Ok(Json(ImportResponse { imported }))
}

/// POST /api/sources/reset - Restore the bundled sources.
pub async fn reset_sources(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    state.coordinator.reset_sources();
    info!("sources reset to defaults");
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/sources/sample - Derive and register a source from a sample.
pub async fn create_from_sample(
    State(state): State<AppState>,
    Json(request): Json<SampleRequest>,
) -> Result<Json<Source>> {
    state
        .coordinator
        .create_from_sample(&request.url, &request.payload)
        .map(Json)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("could not derive a source from '{}'", request.url))
        })
}

/// GET /api/sources/stats - Registry statistics.
pub async fn get_source_stats(State(state): State<AppState>) -> Result<Json<RegistryStats>> {
    Ok(Json(state.coordinator.registry_stats()))
}

// =============================================================================
// Settings
// =============================================================================

/// GET /api/settings - Current capture settings.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>> {
    Ok(Json(state.coordinator.settings()))
}

/// PUT /api/settings - Update capture settings.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>> {
    let settings = update.apply_to(state.coordinator.settings());
    info!(?settings, "updating settings");
    Ok(Json(state.coordinator.update_settings(settings)))
}

/// Rejects sources whose URL patterns cannot match anything.
fn validate_source(source: &Source) -> Result<()> {
    for pattern in &source.url_patterns {
        pattern.validate()?;
    }
    Ok(())
}
