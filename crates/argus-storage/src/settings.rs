//! Runtime capture settings.

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_CAPACITY;

/// User-adjustable capture behavior.
///
/// Unknown or missing fields fall back to defaults so settings saved by
/// older builds keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Master switch for the capture pipeline.
    pub enabled: bool,
    /// Whether events are written to disk.
    pub persist_events: bool,
    /// Event store capacity.
    pub max_events: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            persist_events: false,
            max_events: DEFAULT_CAPACITY,
        }
    }
}
