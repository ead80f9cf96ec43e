//! Application state for the API server.

use std::sync::Arc;

use argus_capture::{CaptureCoordinator, RemotePoller};
use argus_core::SourceRegistry;
use argus_storage::{EventStore, NullPersistence};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Capture pipeline behind every endpoint.
    pub coordinator: Arc<CaptureCoordinator>,
    /// Remote collector poller, when one is configured.
    /// When set, clearing events also clears the collector's backlog.
    pub poller: Option<Arc<RemotePoller>>,
}

impl AppState {
    /// Creates application state around an existing coordinator.
    pub fn new(coordinator: Arc<CaptureCoordinator>) -> Self {
        Self {
            coordinator,
            poller: None,
        }
    }

    /// Creates self-contained state with no persistence.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(CaptureCoordinator::new(
            Arc::new(SourceRegistry::with_defaults()),
            Arc::new(EventStore::new()),
            Arc::new(NullPersistence),
        )))
    }

    /// Attaches a remote collector poller.
    pub fn with_poller(mut self, poller: Arc<RemotePoller>) -> Self {
        self.poller = Some(poller);
        self
    }
}
