//! In-memory event store.
//!
//! Events sit in a capacity-bounded deque, newest at the head. Inserting
//! past capacity drops the oldest entries, never the newest. Mutations
//! publish [`StoreChange`] notifications on a broadcast channel; slow or
//! absent subscribers never block the store.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use argus_core::{Event, ParserKind};

/// Default event capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

const NOTIFY_BUFFER: usize = 64;

/// Store mutation notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// Events were inserted at the head.
    Added { count: usize, total: usize },
    /// All events were discarded.
    Cleared,
    /// Events were replaced from persistence.
    Loaded { count: usize },
    /// Capacity shrank below the current length.
    Resized { capacity: usize },
}

/// Criteria for narrowing stored events. All set fields must match.
///
/// Empty strings and a zero limit count as unset, mirroring the query
/// surface where blank parameters arrive as empty values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    /// Case-insensitive substring of the event name.
    pub event: Option<String>,
    /// Exact parser strategy match.
    pub parser: Option<ParserKind>,
    /// Case-insensitive substring of the capture URL.
    pub url: Option<String>,
    /// Inclusive lower timestamp bound.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound.
    pub end_time: Option<DateTime<Utc>>,
    /// Case-insensitive substring over name, properties, and context.
    pub search: Option<String>,
    /// Keep only the newest N matches.
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Filters by event name substring.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Filters by parser strategy.
    pub fn with_parser(mut self, parser: ParserKind) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Filters by capture URL substring.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Filters by inclusive timestamp range.
    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Filters by full-text search.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Keeps only the newest N matches.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Tests a single event against every set criterion except `limit`.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(term) = used(&self.event) {
            if !event.event_name.to_lowercase().contains(&term.to_lowercase()) {
                return false;
            }
        }

        if let Some(parser) = self.parser {
            if event.capture_metadata.parser_kind != parser {
                return false;
            }
        }

        if let Some(term) = used(&self.url) {
            if !event
                .capture_metadata
                .url
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }

        if let Some(start) = self.start_time {
            if event.timestamp < start {
                return false;
            }
        }

        if let Some(end) = self.end_time {
            if event.timestamp > end {
                return false;
            }
        }

        if let Some(term) = used(&self.search) {
            let haystack = json!({
                "event": event.event_name,
                "properties": event.properties,
                "context": event.context,
            })
            .to_string()
            .to_lowercase();
            if !haystack.contains(&term.to_lowercase()) {
                return false;
            }
        }

        true
    }

    fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0)
    }
}

fn used(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Aggregate statistics over the stored events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Number of stored events.
    pub total: usize,
    /// Event counts per parser strategy.
    pub by_parser: HashMap<String, usize>,
    /// Event counts per event name.
    pub by_event: HashMap<String, usize>,
    /// Oldest and newest stored timestamps.
    pub time_range: TimeRange,
}

/// Oldest and newest timestamps across the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Occupancy of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSize {
    /// Number of stored events.
    pub current: usize,
    /// Capacity.
    pub max: usize,
    /// `current / max` as a percentage.
    pub percentage: f64,
}

#[derive(Debug)]
struct StoreInner {
    events: VecDeque<Event>,
    capacity: usize,
}

/// Capacity-bounded, newest-first event collection.
#[derive(Debug)]
pub struct EventStore {
    inner: RwLock<StoreInner>,
    notifier: broadcast::Sender<StoreChange>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    /// Creates a store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a store with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_BUFFER);
        Self {
            inner: RwLock::new(StoreInner {
                events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                capacity,
            }),
            notifier,
        }
    }

    /// Subscribes to store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.notifier.subscribe()
    }

    /// Inserts a batch at the head, keeping the batch's own order.
    ///
    /// Returns the number inserted. Oldest entries are dropped once the
    /// store exceeds capacity.
    pub fn add(&self, events: Vec<Event>) -> usize {
        if events.is_empty() {
            return 0;
        }

        let count = events.len();
        let total = {
            let mut inner = self.inner.write();
            for event in events.into_iter().rev() {
                inner.events.push_front(event);
            }
            let capacity = inner.capacity;
            inner.events.truncate(capacity);
            inner.events.len()
        };

        self.notify(StoreChange::Added { count, total });
        count
    }

    /// Inserts only events whose id is not already present.
    ///
    /// Returns the number actually inserted.
    pub fn merge(&self, events: Vec<Event>) -> usize {
        let (count, total) = {
            let mut inner = self.inner.write();
            let mut seen: HashSet<String> =
                inner.events.iter().map(|e| e.id.clone()).collect();
            let fresh: Vec<Event> = events
                .into_iter()
                .filter(|e| seen.insert(e.id.clone()))
                .collect();

            let count = fresh.len();
            for event in fresh.into_iter().rev() {
                inner.events.push_front(event);
            }
            let capacity = inner.capacity;
            inner.events.truncate(capacity);
            (count, inner.events.len())
        };

        if count > 0 {
            self.notify(StoreChange::Added { count, total });
        }
        count
    }

    /// Returns every stored event, newest first.
    pub fn all(&self) -> Vec<Event> {
        self.inner.read().events.iter().cloned().collect()
    }

    /// Returns matching events, newest first, truncated to the filter limit.
    pub fn filtered(&self, filter: &EventFilter) -> Vec<Event> {
        let inner = self.inner.read();
        let mut matched: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        if let Some(limit) = filter.effective_limit() {
            matched.truncate(limit);
        }
        matched
    }

    /// Looks up one event by id.
    pub fn get(&self, id: &str) -> Option<Event> {
        self.inner.read().events.iter().find(|e| e.id == id).cloned()
    }

    /// Discards every stored event.
    pub fn clear(&self) {
        self.inner.write().events.clear();
        self.notify(StoreChange::Cleared);
    }

    /// Replaces the contents with persisted events, newest first.
    pub fn load_events(&self, events: Vec<Event>) -> usize {
        let count = {
            let mut inner = self.inner.write();
            inner.events = events.into();
            let capacity = inner.capacity;
            inner.events.truncate(capacity);
            inner.events.len()
        };

        self.notify(StoreChange::Loaded { count });
        count
    }

    /// Changes the capacity, dropping the oldest overflow if shrinking.
    pub fn set_capacity(&self, capacity: usize) {
        let truncated = {
            let mut inner = self.inner.write();
            inner.capacity = capacity;
            if inner.events.len() > capacity {
                inner.events.truncate(capacity);
                true
            } else {
                false
            }
        };

        if truncated {
            self.notify(StoreChange::Resized { capacity });
        }
    }

    /// Computes aggregate statistics over the stored events.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let mut stats = StoreStats {
            total: inner.events.len(),
            ..Default::default()
        };

        for event in &inner.events {
            let parser = event.capture_metadata.parser_kind.as_str().to_string();
            *stats.by_parser.entry(parser).or_insert(0) += 1;

            let name = if event.event_name.is_empty() {
                "unknown".to_string()
            } else {
                event.event_name.clone()
            };
            *stats.by_event.entry(name).or_insert(0) += 1;

            match stats.time_range.oldest {
                Some(oldest) if event.timestamp >= oldest => {}
                _ => stats.time_range.oldest = Some(event.timestamp),
            }
            match stats.time_range.newest {
                Some(newest) if event.timestamp <= newest => {}
                _ => stats.time_range.newest = Some(event.timestamp),
            }
        }

        stats
    }

    /// Reports current occupancy.
    pub fn size(&self) -> StoreSize {
        let inner = self.inner.read();
        let current = inner.events.len();
        let max = inner.capacity;
        let percentage = if max == 0 {
            0.0
        } else {
            (current as f64 / max as f64) * 100.0
        };
        StoreSize {
            current,
            max,
            percentage,
        }
    }

    fn notify(&self, change: StoreChange) {
        if self.notifier.send(change.clone()).is_err() {
            debug!(?change, "no store subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn event(name: &str) -> Event {
        Event::new(name, "track")
    }

    fn event_at(name: &str, secs: i64) -> Event {
        let mut e = event(name);
        e.timestamp = DateTime::UNIX_EPOCH + TimeDelta::seconds(secs);
        e
    }

    fn names(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.event_name.as_str()).collect()
    }

    // ==================== Insertion Tests ====================

    #[test]
    fn test_add_keeps_newest_first() {
        let store = EventStore::new();
        store.add(vec![event("a"), event("b")]);
        store.add(vec![event("c"), event("d")]);

        assert_eq!(names(&store.all()), ["c", "d", "a", "b"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let store = EventStore::with_capacity(3);
        store.add(vec![event("a"), event("b")]);
        store.add(vec![event("c"), event("d")]);

        let all = store.all();
        assert_eq!(all.len(), 3);
        assert_eq!(names(&all), ["c", "d", "a"]);
    }

    #[test]
    fn test_add_empty_is_silent() {
        let store = EventStore::new();
        let mut rx = store.subscribe();

        assert_eq!(store.add(Vec::new()), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_add_notifies_with_counts() {
        let store = EventStore::new();
        let mut rx = store.subscribe();

        store.add(vec![event("a"), event("b")]);
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Added { count: 2, total: 2 });
    }

    #[test]
    fn test_merge_skips_known_ids() {
        let store = EventStore::new();
        let existing = event("a");
        store.add(vec![existing.clone()]);

        let mut dup_in_batch = event("c");
        dup_in_batch.id = "fixed".to_string();
        let mut dup_again = event("d");
        dup_again.id = "fixed".to_string();

        let merged = store.merge(vec![existing, event("b"), dup_in_batch, dup_again]);
        assert_eq!(merged, 2);
        assert_eq!(names(&store.all()), ["b", "c", "a"]);
    }

    #[test]
    fn test_merge_all_duplicates_is_silent() {
        let store = EventStore::new();
        let e = event("a");
        store.add(vec![e.clone()]);
        let mut rx = store.subscribe();

        assert_eq!(store.merge(vec![e]), 0);
        assert!(rx.try_recv().is_err());
    }

    // ==================== Filter Tests ====================

    #[test]
    fn test_filter_by_event_name_substring() {
        let store = EventStore::new();
        store.add(vec![event("page_view"), event("Purchase"), event("click")]);

        let hits = store.filtered(&EventFilter::default().with_event("PUR"));
        assert_eq!(names(&hits), ["Purchase"]);
    }

    #[test]
    fn test_filter_by_parser() {
        let store = EventStore::new();
        let mut ga = event("collect");
        ga.capture_metadata.parser_kind = ParserKind::Measurement;
        store.add(vec![event("track"), ga]);

        let hits = store.filtered(&EventFilter::default().with_parser(ParserKind::Measurement));
        assert_eq!(names(&hits), ["collect"]);
    }

    #[test]
    fn test_filter_by_url_substring() {
        let store = EventStore::new();
        let mut a = event("a");
        a.capture_metadata.url = "https://API.segment.io/v1/track".to_string();
        let mut b = event("b");
        b.capture_metadata.url = "https://mixpanel.com/track".to_string();
        store.add(vec![a, b]);

        let hits = store.filtered(&EventFilter::default().with_url("segment.io"));
        assert_eq!(names(&hits), ["a"]);
    }

    #[test]
    fn test_filter_time_range_is_inclusive() {
        let store = EventStore::new();
        store.add(vec![event_at("early", 10), event_at("mid", 20), event_at("late", 30)]);

        let start = DateTime::UNIX_EPOCH + TimeDelta::seconds(20);
        let end = DateTime::UNIX_EPOCH + TimeDelta::seconds(30);
        let hits = store.filtered(&EventFilter::default().with_time_range(Some(start), Some(end)));
        assert_eq!(names(&hits), ["mid", "late"]);
    }

    #[test]
    fn test_filter_search_spans_properties_and_context() {
        let store = EventStore::new();
        let mut a = event("a");
        a.properties.insert("plan".into(), serde_json::json!("Enterprise"));
        let mut b = event("b");
        b.context.insert("user_agent".into(), serde_json::json!("FancyBrowser"));
        store.add(vec![a, b, event("c")]);

        assert_eq!(
            names(&store.filtered(&EventFilter::default().with_search("enterprise"))),
            ["a"]
        );
        assert_eq!(
            names(&store.filtered(&EventFilter::default().with_search("fancybrowser"))),
            ["b"]
        );
    }

    #[test]
    fn test_filter_limit_keeps_newest() {
        let store = EventStore::new();
        store.add(vec![event("a"), event("b"), event("c")]);

        let hits = store.filtered(&EventFilter::default().with_limit(2));
        assert_eq!(names(&hits), ["a", "b"]);
    }

    #[test]
    fn test_blank_filter_values_are_ignored() {
        let store = EventStore::new();
        store.add(vec![event("a"), event("b")]);

        let filter = EventFilter {
            event: Some(String::new()),
            search: Some(String::new()),
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(store.filtered(&filter).len(), 2);
    }

    #[test]
    fn test_filters_compose_with_and() {
        let store = EventStore::new();
        let mut a = event_at("signup", 10);
        a.capture_metadata.url = "https://a.com/events".to_string();
        let mut b = event_at("signup", 100);
        b.capture_metadata.url = "https://b.com/events".to_string();
        store.add(vec![a, b]);

        let filter = EventFilter::default()
            .with_event("signup")
            .with_url("a.com")
            .with_time_range(Some(DateTime::UNIX_EPOCH), None);
        assert_eq!(store.filtered(&filter).len(), 1);
    }

    // ==================== Lookup Tests ====================

    #[test]
    fn test_get_by_id() {
        let store = EventStore::new();
        let e = event("a");
        let id = e.id.clone();
        store.add(vec![e]);

        assert_eq!(store.get(&id).unwrap().event_name, "a");
        assert!(store.get("missing").is_none());
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_counts_and_range() {
        let store = EventStore::new();
        let mut ga = event_at("collect", 50);
        ga.capture_metadata.parser_kind = ParserKind::Measurement;
        store.add(vec![
            event_at("click", 10),
            event_at("click", 90),
            event_at("", 40),
            ga,
        ]);

        let stats = store.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_parser.get("generic"), Some(&3));
        assert_eq!(stats.by_parser.get("measurement"), Some(&1));
        assert_eq!(stats.by_event.get("click"), Some(&2));
        assert_eq!(stats.by_event.get("unknown"), Some(&1));
        assert_eq!(
            stats.time_range.oldest,
            Some(DateTime::UNIX_EPOCH + TimeDelta::seconds(10))
        );
        assert_eq!(
            stats.time_range.newest,
            Some(DateTime::UNIX_EPOCH + TimeDelta::seconds(90))
        );
    }

    #[test]
    fn test_stats_empty_store() {
        let stats = EventStore::new().stats();
        assert_eq!(stats.total, 0);
        assert!(stats.time_range.oldest.is_none());
        assert!(stats.time_range.newest.is_none());
    }

    // ==================== Capacity Tests ====================

    #[test]
    fn test_set_capacity_truncates_and_notifies() {
        let store = EventStore::new();
        store.add(vec![event("a"), event("b"), event("c")]);
        let mut rx = store.subscribe();

        store.set_capacity(2);
        assert_eq!(names(&store.all()), ["a", "b"]);
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Resized { capacity: 2 });
    }

    #[test]
    fn test_growing_capacity_is_silent() {
        let store = EventStore::with_capacity(2);
        store.add(vec![event("a")]);
        let mut rx = store.subscribe();

        store.set_capacity(10);
        assert!(rx.try_recv().is_err());
        assert_eq!(store.size().max, 10);
    }

    #[test]
    fn test_size_percentage() {
        let store = EventStore::with_capacity(4);
        store.add(vec![event("a"), event("b")]);

        let size = store.size();
        assert_eq!(size.current, 2);
        assert_eq!(size.max, 4);
        assert!((size.percentage - 50.0).abs() < f64::EPSILON);
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_clear_notifies() {
        let store = EventStore::new();
        store.add(vec![event("a")]);
        let mut rx = store.subscribe();

        store.clear();
        assert!(store.all().is_empty());
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Cleared);
    }

    #[test]
    fn test_load_events_replaces_and_truncates() {
        let store = EventStore::with_capacity(2);
        store.add(vec![event("old")]);
        let mut rx = store.subscribe();

        let count = store.load_events(vec![event("x"), event("y"), event("z")]);
        assert_eq!(count, 2);
        assert_eq!(names(&store.all()), ["x", "y"]);
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Loaded { count: 2 });
    }
}
