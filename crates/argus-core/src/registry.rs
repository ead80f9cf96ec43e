//! Source registry and URL matching.
//!
//! The registry owns the ordered list of source definitions plus one
//! designated fallback. Matching walks enabled sources in registration
//! order and short-circuits on the first hit, so overlapping patterns
//! resolve deterministically: first registered wins. The fallback is
//! consulted only after every listed source has been tried.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::defaults::{bundled_sources, fallback_source};
use crate::error::{RegistryError, Result};
use crate::source::{Provenance, Source};

/// Aggregate counters over the registered sources.
///
/// The fallback is not a registered source and is excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Number of registered sources.
    pub total_sources: usize,
    /// Number of enabled sources.
    pub enabled_sources: usize,
    /// Number of user-created sources.
    pub user_sources: usize,
    /// Events captured across all registered sources.
    pub total_events: u64,
}

/// Ordered collection of source definitions with first-hit URL matching.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: RwLock<Vec<Source>>,
    fallback: RwLock<Option<Source>>,
}

impl SourceRegistry {
    /// Creates an empty registry with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the bundled sources and fallback.
    pub fn with_defaults() -> Self {
        Self {
            sources: RwLock::new(bundled_sources()),
            fallback: RwLock::new(Some(fallback_source())),
        }
    }

    /// Finds the source responsible for a URL.
    ///
    /// Enabled sources are tried in registration order and the first match
    /// wins. The fallback is only consulted when no listed source matches.
    pub fn find_for_url(&self, url: &str) -> Option<Source> {
        if let Some(source) = self.sources.read().iter().find(|s| s.matches_url(url)) {
            return Some(source.clone());
        }

        self.fallback
            .read()
            .as_ref()
            .filter(|f| f.matches_url(url))
            .cloned()
    }

    /// Looks up a source by id, including the fallback.
    pub fn get(&self, id: &str) -> Option<Source> {
        if let Some(source) = self.sources.read().iter().find(|s| s.id == id) {
            return Some(source.clone());
        }
        self.fallback.read().as_ref().filter(|f| f.id == id).cloned()
    }

    /// Returns all registered sources in registration order.
    pub fn list(&self) -> Vec<Source> {
        self.sources.read().clone()
    }

    /// Adds a source, or replaces the one with the same id in place.
    ///
    /// An id matching the designated fallback updates the fallback slot
    /// instead of the list.
    pub fn upsert(&self, mut source: Source) {
        source.normalize();

        {
            let mut fallback = self.fallback.write();
            if let Some(current) = fallback.as_ref() {
                if current.id == source.id {
                    info!(id = %source.id, "updated fallback source");
                    *fallback = Some(source);
                    return;
                }
            }
        }

        let mut sources = self.sources.write();
        upsert_into(&mut sources, source);
    }

    /// Removes a registered source. Returns false if the id was unknown.
    pub fn remove(&self, id: &str) -> bool {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|s| s.id != id);
        let removed = sources.len() < before;
        if removed {
            info!(id, "removed source");
        }
        removed
    }

    /// Enables or disables a source. Returns false if the id was unknown.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        {
            let mut sources = self.sources.write();
            if let Some(source) = sources.iter_mut().find(|s| s.id == id) {
                source.enabled = enabled;
                info!(id, enabled, "toggled source");
                return true;
            }
        }

        let mut fallback = self.fallback.write();
        if let Some(f) = fallback.as_mut() {
            if f.id == id {
                f.enabled = enabled;
                info!(id, enabled, "toggled fallback source");
                return true;
            }
        }
        false
    }

    /// Records one captured event against a source's statistics.
    pub fn record_capture(&self, id: &str) {
        {
            let mut sources = self.sources.write();
            if let Some(source) = sources.iter_mut().find(|s| s.id == id) {
                source.record_capture();
                return;
            }
        }

        let mut fallback = self.fallback.write();
        if let Some(f) = fallback.as_mut() {
            if f.id == id {
                f.record_capture();
            }
        }
    }

    /// Imports source definitions from a JSON array.
    ///
    /// The whole document is parsed before anything is applied, so a
    /// malformed import changes nothing. Returns the number of records
    /// applied.
    pub fn import_from(&self, data: &str) -> Result<usize> {
        let records: Vec<Source> = serde_json::from_str(data).map_err(RegistryError::Import)?;
        let count = records.len();

        let mut sources = self.sources.write();
        for mut source in records {
            source.normalize();
            upsert_into(&mut sources, source);
        }
        info!(count, "imported source definitions");
        Ok(count)
    }

    /// Exports user-created sources as a pretty-printed JSON array.
    pub fn export_user(&self) -> String {
        let sources = self.sources.read();
        let user: Vec<&Source> = sources
            .iter()
            .filter(|s| s.created_by == Provenance::User)
            .collect();
        serde_json::to_string_pretty(&user).unwrap_or_else(|_| "[]".to_string())
    }

    /// Discards every definition and restores the bundled set.
    pub fn reset_to_defaults(&self) {
        *self.sources.write() = bundled_sources();
        *self.fallback.write() = Some(fallback_source());
        info!("reset sources to defaults");
    }

    /// Applies persisted definitions over the current list.
    ///
    /// Known ids are replaced in place, keeping their registration order;
    /// unknown ids are appended, oldest first.
    pub fn overlay_saved(&self, saved: HashMap<String, Source>) {
        let mut sources = self.sources.write();
        let mut added: Vec<Source> = Vec::new();

        for (_, mut source) in saved {
            source.normalize();
            match sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source,
                None => added.push(source),
            }
        }

        added.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sources.extend(added);
        debug!(total = sources.len(), "overlaid saved source definitions");
    }

    /// Collects the definitions worth persisting.
    ///
    /// User sources are always saved. Bundled sources are saved only when
    /// they differ from their bundled form (edits and capture statistics
    /// both count); unmodified defaults reload fresh.
    pub fn to_saved(&self) -> HashMap<String, Source> {
        let bundled: HashMap<String, Source> = bundled_sources()
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let sources = self.sources.read();
        let mut saved = HashMap::new();
        for source in sources.iter() {
            let keep = match source.created_by {
                Provenance::User => true,
                Provenance::System => bundled.get(&source.id).is_some_and(|b| b != source),
            };
            if keep {
                saved.insert(source.id.clone(), source.clone());
            }
        }
        saved
    }

    /// Computes aggregate counters over the registered sources.
    pub fn stats(&self) -> RegistryStats {
        let sources = self.sources.read();
        let mut stats = RegistryStats {
            total_sources: sources.len(),
            ..Default::default()
        };
        for source in sources.iter() {
            if source.enabled {
                stats.enabled_sources += 1;
            }
            if source.created_by == Provenance::User {
                stats.user_sources += 1;
            }
            stats.total_events += source.stats.capture_count;
        }
        stats
    }

    /// Returns the designated fallback source, if any.
    pub fn fallback(&self) -> Option<Source> {
        self.fallback.read().clone()
    }

    /// Replaces the designated fallback source.
    pub fn set_fallback(&self, fallback: Option<Source>) {
        *self.fallback.write() = fallback;
    }
}

fn upsert_into(sources: &mut Vec<Source>, source: Source) {
    match sources.iter_mut().find(|s| s.id == source.id) {
        Some(existing) => {
            info!(id = %source.id, "updated source");
            *existing = source;
        }
        None => {
            info!(id = %source.id, "registered source");
            sources.push(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::FALLBACK_ID;
    use crate::source::UrlPattern;

    fn tracked(id: &str, pattern: &str) -> Source {
        Source::user(id, id).with_pattern(UrlPattern::contains(pattern))
    }

    // ==================== Matching Tests ====================

    #[test]
    fn test_first_registered_source_wins() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("first", "/track"));
        registry.upsert(tracked("second", "example.com"));

        let hit = registry.find_for_url("https://example.com/track").unwrap();
        assert_eq!(hit.id, "first");
    }

    #[test]
    fn test_disabled_source_is_skipped() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("first", "/track"));
        registry.upsert(tracked("second", "example.com"));
        assert!(registry.set_enabled("first", false));

        let hit = registry.find_for_url("https://example.com/track").unwrap();
        assert_eq!(hit.id, "second");
    }

    #[test]
    fn test_fallback_only_when_nothing_matches() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("app", "myapp.com"));
        registry.set_fallback(Some(fallback_source()));

        let direct = registry.find_for_url("https://myapp.com/events").unwrap();
        assert_eq!(direct.id, "app");

        let fell_back = registry.find_for_url("https://other.com/events").unwrap();
        assert_eq!(fell_back.id, FALLBACK_ID);

        assert!(registry.find_for_url("https://other.com/profile").is_none());
    }

    #[test]
    fn test_no_fallback_means_no_match() {
        let registry = SourceRegistry::new();
        assert!(registry.find_for_url("https://other.com/events").is_none());
    }

    #[test]
    fn test_malformed_regex_source_falls_through() {
        let registry = SourceRegistry::new();
        registry.upsert(
            Source::user("broken", "Broken").with_pattern(UrlPattern::regex("([unclosed")),
        );
        registry.set_fallback(Some(fallback_source()));

        let hit = registry.find_for_url("https://site.com/([unclosed/events").unwrap();
        assert_eq!(hit.id, FALLBACK_ID);
    }

    // ==================== CRUD Tests ====================

    #[test]
    fn test_upsert_replaces_in_place() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("a", "a.com"));
        registry.upsert(tracked("b", "b.com"));

        let mut replacement = tracked("a", "a.com");
        replacement.name = "Renamed".to_string();
        registry.upsert(replacement);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[0].name, "Renamed");
        assert_eq!(listed[1].id, "b");
    }

    #[test]
    fn test_upsert_normalizes_blank_fields() {
        let registry = SourceRegistry::new();
        let mut source = tracked("blank", "blank.com");
        source.name.clear();
        source.color.clear();
        source.icon.clear();
        registry.upsert(source);

        let stored = registry.get("blank").unwrap();
        assert_eq!(stored.name, "blank");
        assert!(!stored.color.is_empty());
        assert!(!stored.icon.is_empty());
    }

    #[test]
    fn test_upsert_with_fallback_id_updates_slot() {
        let registry = SourceRegistry::with_defaults();

        let mut edited = registry.fallback().unwrap();
        edited.enabled = false;
        registry.upsert(edited);

        assert!(!registry.fallback().unwrap().enabled);
        assert!(registry.list().iter().all(|s| s.id != FALLBACK_ID));
    }

    #[test]
    fn test_remove() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("a", "a.com"));

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_set_enabled_unknown_id() {
        let registry = SourceRegistry::new();
        assert!(!registry.set_enabled("ghost", false));
    }

    #[test]
    fn test_record_capture_reaches_fallback() {
        let registry = SourceRegistry::with_defaults();
        registry.record_capture(FALLBACK_ID);
        registry.record_capture("segment");

        assert_eq!(registry.fallback().unwrap().stats.capture_count, 1);
        assert_eq!(registry.get("segment").unwrap().stats.capture_count, 1);
    }

    // ==================== Import/Export Tests ====================

    #[test]
    fn test_import_applies_all_records() {
        let registry = SourceRegistry::new();
        let data = r#"[
            {"id": "one", "name": "One", "urlPatterns": [{"pattern": "one.com", "type": "contains"}]},
            {"id": "two", "urlPatterns": [{"pattern": "two.com", "type": "contains"}]}
        ]"#;

        let imported = registry.import_from(data).unwrap();
        assert_eq!(imported, 2);

        let two = registry.get("two").unwrap();
        assert_eq!(two.name, "two");
        assert_eq!(two.created_by, Provenance::User);
    }

    #[test]
    fn test_import_rejects_malformed_json_without_changes() {
        let registry = SourceRegistry::new();
        registry.upsert(tracked("keep", "keep.com"));

        let err = registry.import_from(r#"[{"id": "one"}, {"id":"#);
        assert!(err.is_err());
        assert_eq!(registry.list().len(), 1);
        assert!(registry.get("one").is_none());
    }

    #[test]
    fn test_export_then_import_roundtrip() {
        let registry = SourceRegistry::with_defaults();
        registry.upsert(tracked("mine", "mine.dev"));

        let exported = registry.export_user();

        let restored = SourceRegistry::new();
        assert_eq!(restored.import_from(&exported).unwrap(), 1);
        assert_eq!(restored.get("mine").unwrap().name, "mine");
        // Bundled sources are not part of a user export.
        assert!(restored.get("segment").is_none());
    }

    // ==================== Persistence Shape Tests ====================

    #[test]
    fn test_to_saved_skips_untouched_defaults() {
        let registry = SourceRegistry::with_defaults();
        assert!(registry.to_saved().is_empty());
    }

    #[test]
    fn test_to_saved_keeps_user_and_modified_sources() {
        let registry = SourceRegistry::with_defaults();
        registry.upsert(tracked("mine", "mine.dev"));
        registry.set_enabled("segment", false);
        registry.record_capture("reddit");

        let saved = registry.to_saved();
        assert!(saved.contains_key("mine"));
        assert!(saved.contains_key("segment"));
        assert!(saved.contains_key("reddit"));
        assert!(!saved.contains_key("mixpanel"));
    }

    #[test]
    fn test_overlay_replaces_in_place_and_appends_sorted() {
        let registry = SourceRegistry::with_defaults();
        let position = |r: &SourceRegistry, id: &str| {
            r.list().iter().position(|s| s.id == id).unwrap()
        };
        let segment_pos = position(&registry, "segment");

        let mut segment = registry.get("segment").unwrap();
        segment.enabled = false;

        let mut older = tracked("older", "older.com");
        older.created_at = chrono::DateTime::UNIX_EPOCH + chrono::TimeDelta::seconds(5);
        let mut newer = tracked("newer", "newer.com");
        newer.created_at = chrono::DateTime::UNIX_EPOCH + chrono::TimeDelta::seconds(9);

        let saved: HashMap<String, Source> = [segment, newer, older]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        registry.overlay_saved(saved);

        assert_eq!(position(&registry, "segment"), segment_pos);
        assert!(!registry.get("segment").unwrap().enabled);

        let listed = registry.list();
        assert_eq!(listed[listed.len() - 2].id, "older");
        assert_eq!(listed[listed.len() - 1].id, "newer");
    }

    #[test]
    fn test_reset_to_defaults() {
        let registry = SourceRegistry::with_defaults();
        registry.upsert(tracked("mine", "mine.dev"));
        registry.set_enabled("segment", false);

        registry.reset_to_defaults();

        assert!(registry.get("mine").is_none());
        assert!(registry.get("segment").unwrap().enabled);
        assert!(registry.fallback().is_some());
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_counts() {
        let registry = SourceRegistry::with_defaults();
        let bundled_count = registry.list().len();

        registry.upsert(tracked("mine", "mine.dev"));
        registry.set_enabled("segment", false);
        registry.record_capture("reddit");
        registry.record_capture("reddit");
        registry.record_capture(FALLBACK_ID);

        let stats = registry.stats();
        assert_eq!(stats.total_sources, bundled_count + 1);
        assert_eq!(stats.enabled_sources, bundled_count);
        assert_eq!(stats.user_sources, 1);
        // Fallback captures are not part of registered-source totals.
        assert_eq!(stats.total_events, 2);
    }
}
