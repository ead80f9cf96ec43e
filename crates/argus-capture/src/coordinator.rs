//! Capture coordination.
//!
//! [`CaptureCoordinator`] ties the pipeline together: it matches incoming
//! requests against the source registry, decodes and parses their bodies,
//! stamps provenance onto the resulting events, and hands them to the
//! store. Persistence runs off the hot path whenever a runtime is around.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use argus_core::{
    source_from_sample, CaptureMetadata, Event, RegistryError, RegistryStats, Source,
    SourceRegistry,
};
use argus_storage::{
    export_csv, export_json, EventFilter, EventStore, Persistence, Settings, StoreChange,
    StoreSize, StoreStats,
};

use crate::decoder::{self, CaptureBody};
use crate::parsers;

// =============================================================================
// Capture Request
// =============================================================================

/// One observed network request, as submitted for capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub url: String,
    /// HTTP method of the observed request. Only POST bodies carry events.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body: Option<CaptureBody>,
    /// Page that issued the request, when known.
    #[serde(default)]
    pub initiator: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            body: None,
            initiator: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_body(mut self, body: CaptureBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }
}

// =============================================================================
// Capture Coordinator
// =============================================================================

/// Orchestrates matching, decoding, parsing, and storage for captures.
pub struct CaptureCoordinator {
    registry: Arc<SourceRegistry>,
    store: Arc<EventStore>,
    persistence: Arc<dyn Persistence>,
    settings: RwLock<Settings>,
}

impl CaptureCoordinator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<EventStore>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            registry,
            store,
            persistence,
            settings: RwLock::new(Settings::default()),
        }
    }

    /// Restores settings, saved sources, and (when enabled) persisted
    /// events. Call once at startup.
    pub fn load(&self) {
        match self.persistence.load_settings() {
            Ok(Some(settings)) => {
                self.store.set_capacity(settings.max_events);
                *self.settings.write() = settings;
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "failed to load settings"),
        }

        match self.persistence.load_sources() {
            Ok(Some(saved)) => {
                let count = saved.len();
                self.registry.overlay_saved(saved);
                info!(count, "applied saved sources");
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "failed to load saved sources"),
        }

        if self.settings.read().persist_events {
            match self.persistence.load_events() {
                Ok(Some(events)) => {
                    let count = self.store.load_events(events);
                    info!(count, "restored persisted events");
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "failed to load persisted events"),
            }
        }
    }

    // ==================== Capture ====================

    /// Runs one request through the pipeline. Returns how many events it
    /// produced; unmatched, non-POST, or disabled captures produce zero.
    pub fn handle_request(&self, request: &CaptureRequest) -> usize {
        if !self.settings.read().enabled {
            return 0;
        }
        if request.method != "POST" {
            return 0;
        }
        let Some(source) = self.registry.find_for_url(&request.url) else {
            debug!(url = %request.url, "no source matched");
            return 0;
        };

        let payload = decoder::decode(request.body.as_ref());
        let mut events = parsers::parse(source.parser, &payload, &source);
        if events.is_empty() {
            debug!(source = %source.id, url = %request.url, "request produced no events");
            return 0;
        }

        let captured_at = Utc::now();
        for event in &mut events {
            event.source_id = source.id.clone();
            event.source_name = Some(source.name.clone());
            event.capture_metadata = CaptureMetadata {
                captured_at,
                url: request.url.clone(),
                initiator: request.initiator.clone(),
                parser_kind: source.parser,
            };
        }

        let count = self.store.add(events);
        self.registry.record_capture(&source.id);
        info!(source = %source.id, count, "captured events");
        self.persist_events_soon();
        count
    }

    /// Merges externally collected events, skipping ids already stored.
    pub fn merge_events(&self, events: Vec<Event>) -> usize {
        let added = self.store.merge(events);
        if added > 0 {
            self.persist_events_soon();
        }
        added
    }

    // ==================== Events ====================

    pub fn events(&self, filter: &EventFilter) -> Vec<Event> {
        self.store.filtered(filter)
    }

    pub fn event(&self, id: &str) -> Option<Event> {
        self.store.get(id)
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn store_size(&self) -> StoreSize {
        self.store.size()
    }

    /// Drops all stored events without touching the persisted copy.
    pub fn clear_events(&self) {
        self.store.clear();
    }

    /// Drops all stored events and the persisted copy.
    pub fn clear_all(&self) -> bool {
        self.store.clear();
        match self.persistence.clear_events() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "failed to clear persisted events");
                false
            }
        }
    }

    /// Writes the current store contents out, regardless of settings.
    pub fn save_events(&self) -> bool {
        let events = self.store.all();
        match self.persistence.save_events(&events) {
            Ok(()) => {
                info!(count = events.len(), "saved events");
                true
            }
            Err(error) => {
                warn!(%error, "failed to save events");
                false
            }
        }
    }

    /// Replaces the store contents with the persisted copy, if one exists.
    pub fn load_persisted_events(&self) -> bool {
        match self.persistence.load_events() {
            Ok(Some(events)) => {
                let count = self.store.load_events(events);
                info!(count, "loaded persisted events");
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(%error, "failed to load persisted events");
                false
            }
        }
    }

    pub fn export_events_json(&self, filter: &EventFilter) -> String {
        export_json(&self.store.filtered(filter))
    }

    pub fn export_events_csv(&self, filter: &EventFilter) -> String {
        export_csv(&self.store.filtered(filter))
    }

    /// Notifications for store changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    // ==================== Sources ====================

    pub fn list_sources(&self) -> Vec<Source> {
        self.registry.list()
    }

    pub fn get_source(&self, id: &str) -> Option<Source> {
        self.registry.get(id)
    }

    pub fn fallback_source(&self) -> Option<Source> {
        self.registry.fallback()
    }

    pub fn upsert_source(&self, source: Source) {
        self.registry.upsert(source);
        self.persist_sources_soon();
    }

    pub fn remove_source(&self, id: &str) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            self.persist_sources_soon();
        }
        removed
    }

    pub fn import_sources(&self, data: &str) -> Result<usize, RegistryError> {
        let count = self.registry.import_from(data)?;
        self.persist_sources_soon();
        Ok(count)
    }

    pub fn export_sources(&self) -> String {
        self.registry.export_user()
    }

    /// Restores the bundled sources and forgets all saved customizations.
    pub fn reset_sources(&self) {
        self.registry.reset_to_defaults();
        let persistence = Arc::clone(&self.persistence);
        self.run_off_path(move || {
            if let Err(error) = persistence.clear_sources() {
                warn!(%error, "failed to clear saved sources");
            }
        });
    }

    /// Derives a source from a sample request and registers it.
    pub fn create_from_sample(&self, url: &str, payload: &Value) -> Option<Source> {
        let source = source_from_sample(url, payload)?;
        info!(source = %source.id, url, "created source from sample");
        self.upsert_source(source.clone());
        Some(source)
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    // ==================== Settings ====================

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Applies new settings, resizing the store to match.
    pub fn update_settings(&self, settings: Settings) -> Settings {
        self.store.set_capacity(settings.max_events);

        let persistence = Arc::clone(&self.persistence);
        let to_save = settings.clone();
        self.run_off_path(move || {
            if let Err(error) = persistence.save_settings(&to_save) {
                warn!(%error, "failed to persist settings");
            }
        });

        *self.settings.write() = settings.clone();
        settings
    }

    // ==================== Background work ====================

    /// Saves the store on a fixed cadence while event persistence is on.
    pub fn start_autosave(self: &Arc<Self>, interval: Duration) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let due = coordinator.settings.read().persist_events
                    && coordinator.store.size().current > 0;
                if due {
                    coordinator.save_events();
                }
            }
        });
    }

    fn persist_events_soon(&self) {
        if !self.settings.read().persist_events {
            return;
        }
        let events = self.store.all();
        let persistence = Arc::clone(&self.persistence);
        self.run_off_path(move || {
            if let Err(error) = persistence.save_events(&events) {
                warn!(%error, "failed to persist events");
            }
        });
    }

    fn persist_sources_soon(&self) {
        let saved = self.registry.to_saved();
        let persistence = Arc::clone(&self.persistence);
        self.run_off_path(move || {
            if let Err(error) = persistence.save_sources(&saved) {
                warn!(%error, "failed to persist sources");
            }
        });
    }

    /// Runs file work on the blocking pool inside a runtime, inline
    /// otherwise.
    fn run_off_path<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(_) => task(),
        }
    }
}
