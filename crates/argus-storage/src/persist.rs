//! File-backed persistence for sources, events, and settings.
//!
//! Each document lives in its own JSON file under the data directory.
//! Writes go to a temp file first and rename into place, so a crash
//! mid-write never leaves a torn document behind.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use argus_core::{Event, Source};

use crate::error::{Result, StorageError};
use crate::settings::Settings;

const SOURCES_FILE: &str = "sources.json";
const EVENTS_FILE: &str = "events.json";
const SETTINGS_FILE: &str = "settings.json";

/// Storage backend for the capture pipeline's durable state.
///
/// Loads return `Ok(None)` when nothing was ever saved; that is not an
/// error, just a first run.
pub trait Persistence: Send + Sync {
    /// Loads saved source definitions keyed by id.
    fn load_sources(&self) -> Result<Option<HashMap<String, Source>>>;

    /// Saves source definitions keyed by id.
    fn save_sources(&self, sources: &HashMap<String, Source>) -> Result<()>;

    /// Removes saved source definitions.
    fn clear_sources(&self) -> Result<()>;

    /// Loads saved events, newest first.
    fn load_events(&self) -> Result<Option<Vec<Event>>>;

    /// Saves events, newest first.
    fn save_events(&self, events: &[Event]) -> Result<()>;

    /// Removes saved events.
    fn clear_events(&self) -> Result<()>;

    /// Loads saved settings.
    fn load_settings(&self) -> Result<Option<Settings>>;

    /// Saves settings.
    fn save_settings(&self, settings: &Settings) -> Result<()>;
}

/// JSON-file persistence rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Opens persistence in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::default_data_dir()?)
    }

    /// Opens persistence rooted at a specific directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Persisting to: {:?}", dir);
        Ok(Self { dir })
    }

    /// Returns the default app data directory.
    pub fn default_data_dir() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("com", "argus", "argus").ok_or(StorageError::NoDataDir)?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Directory this persistence writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_file<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save_file<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        let text = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Persistence for FilePersistence {
    fn load_sources(&self) -> Result<Option<HashMap<String, Source>>> {
        self.load_file(SOURCES_FILE)
    }

    fn save_sources(&self, sources: &HashMap<String, Source>) -> Result<()> {
        debug!(count = sources.len(), "saving sources");
        self.save_file(SOURCES_FILE, sources)
    }

    fn clear_sources(&self) -> Result<()> {
        self.remove_file(SOURCES_FILE)
    }

    fn load_events(&self) -> Result<Option<Vec<Event>>> {
        self.load_file(EVENTS_FILE)
    }

    fn save_events(&self, events: &[Event]) -> Result<()> {
        debug!(count = events.len(), "saving events");
        self.save_file(EVENTS_FILE, &events)
    }

    fn clear_events(&self) -> Result<()> {
        self.remove_file(EVENTS_FILE)
    }

    fn load_settings(&self) -> Result<Option<Settings>> {
        self.load_file(SETTINGS_FILE)
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.save_file(SETTINGS_FILE, settings)
    }
}

/// Persistence that stores nothing and loads nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

impl Persistence for NullPersistence {
    fn load_sources(&self) -> Result<Option<HashMap<String, Source>>> {
        Ok(None)
    }

    fn save_sources(&self, _sources: &HashMap<String, Source>) -> Result<()> {
        Ok(())
    }

    fn clear_sources(&self) -> Result<()> {
        Ok(())
    }

    fn load_events(&self) -> Result<Option<Vec<Event>>> {
        Ok(None)
    }

    fn save_events(&self, _events: &[Event]) -> Result<()> {
        Ok(())
    }

    fn clear_events(&self) -> Result<()> {
        Ok(())
    }

    fn load_settings(&self) -> Result<Option<Settings>> {
        Ok(None)
    }

    fn save_settings(&self, _settings: &Settings) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::Event;

    fn open_temp() -> (tempfile::TempDir, FilePersistence) {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::with_dir(dir.path()).unwrap();
        (dir, persistence)
    }

    // ==================== Roundtrip Tests ====================

    #[test]
    fn test_first_run_loads_nothing() {
        let (_dir, persistence) = open_temp();
        assert!(persistence.load_sources().unwrap().is_none());
        assert!(persistence.load_events().unwrap().is_none());
        assert!(persistence.load_settings().unwrap().is_none());
    }

    #[test]
    fn test_events_roundtrip() {
        let (_dir, persistence) = open_temp();
        let events = vec![Event::new("a", "track"), Event::new("b", "track")];

        persistence.save_events(&events).unwrap();
        let loaded = persistence.load_events().unwrap().unwrap();
        assert_eq!(loaded, events);
    }

    #[test]
    fn test_sources_roundtrip() {
        let (_dir, persistence) = open_temp();
        let mut sources = HashMap::new();
        sources.insert("mine".to_string(), Source::user("mine", "Mine"));

        persistence.save_sources(&sources).unwrap();
        let loaded = persistence.load_sources().unwrap().unwrap();
        assert_eq!(loaded, sources);
    }

    #[test]
    fn test_settings_roundtrip() {
        let (_dir, persistence) = open_temp();
        let settings = Settings {
            enabled: false,
            persist_events: true,
            max_events: 42,
        };

        persistence.save_settings(&settings).unwrap();
        assert_eq!(persistence.load_settings().unwrap().unwrap(), settings);
    }

    // ==================== File Handling Tests ====================

    #[test]
    fn test_no_temp_file_left_behind() {
        let (dir, persistence) = open_temp();
        persistence.save_events(&[Event::new("a", "track")]).unwrap();

        assert!(dir.path().join(EVENTS_FILE).exists());
        assert!(!dir.path().join(format!("{EVENTS_FILE}.tmp")).exists());
    }

    #[test]
    fn test_clear_removes_file_and_tolerates_absence() {
        let (dir, persistence) = open_temp();
        persistence.save_events(&[Event::new("a", "track")]).unwrap();

        persistence.clear_events().unwrap();
        assert!(!dir.path().join(EVENTS_FILE).exists());
        // Clearing again is not an error.
        persistence.clear_events().unwrap();
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let (dir, persistence) = open_temp();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();

        assert!(persistence.load_settings().is_err());
    }

    #[test]
    fn test_null_persistence_is_inert() {
        let persistence = NullPersistence;
        persistence.save_events(&[Event::new("a", "track")]).unwrap();
        assert!(persistence.load_events().unwrap().is_none());
    }
}
