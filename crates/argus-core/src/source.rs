//! Analytics source definitions.
//!
//! A [`Source`] describes one analytics destination: the URL patterns that
//! identify its collection endpoints, the parser strategy for its payloads,
//! field mappings for the generic parser, visual identity, and capture
//! statistics.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, Result};
use crate::paths::get_path;

// =============================================================================
// URL Patterns
// =============================================================================

/// How a URL pattern is compared against a request URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Case-insensitive substring test.
    #[default]
    Contains,
    /// Case-insensitive regular expression over the full URL.
    Regex,
    /// Byte-for-byte string equality.
    Exact,
}

impl PatternType {
    /// Returns the pattern type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Contains => "contains",
            PatternType::Regex => "regex",
            PatternType::Exact => "exact",
        }
    }

    /// Parses a pattern type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contains" => Some(PatternType::Contains),
            "regex" => Some(PatternType::Regex),
            "exact" => Some(PatternType::Exact),
            _ => None,
        }
    }
}

/// A single URL pattern attached to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlPattern {
    /// The pattern text.
    pub pattern: String,
    /// How the pattern is applied.
    #[serde(rename = "type", default)]
    pub kind: PatternType,
}

impl UrlPattern {
    /// Creates a substring pattern.
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternType::Contains,
        }
    }

    /// Creates a regular-expression pattern.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternType::Regex,
        }
    }

    /// Creates an exact-match pattern.
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternType::Exact,
        }
    }

    /// Tests this pattern against a URL.
    ///
    /// A malformed regex never matches; match resolution must not fail on
    /// bad user input.
    pub fn matches(&self, url: &str) -> bool {
        match self.kind {
            PatternType::Contains => url.to_lowercase().contains(&self.pattern.to_lowercase()),
            PatternType::Regex => RegexBuilder::new(&self.pattern)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            PatternType::Exact => url == self.pattern,
        }
    }

    /// Validates the pattern text, surfacing errors a silent match hides.
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(RegistryError::InvalidPattern {
                kind: self.kind.as_str(),
                pattern: self.pattern.clone(),
                reason: "pattern is empty".to_string(),
            });
        }
        if self.kind == PatternType::Regex {
            RegexBuilder::new(&self.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| RegistryError::InvalidPattern {
                    kind: self.kind.as_str(),
                    pattern: self.pattern.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

// =============================================================================
// Field Mappings
// =============================================================================

/// Candidate dot-paths for one logical event field.
///
/// Serialized as either a single string or an ordered list, matching the
/// shapes found in persisted source definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldPaths {
    /// A single dot-path, or the literal [`FieldPaths::ALL`] marker.
    One(String),
    /// Candidate dot-paths, tried in order.
    Many(Vec<String>),
}

impl FieldPaths {
    /// Marker that maps the entire payload instead of a single path.
    pub const ALL: &'static str = "all";

    /// Creates a single-path mapping.
    pub fn one(path: impl Into<String>) -> Self {
        FieldPaths::One(path.into())
    }

    /// Creates an ordered multi-path mapping.
    pub fn many<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldPaths::Many(paths.into_iter().map(Into::into).collect())
    }

    /// Creates the whole-payload marker mapping.
    pub fn all() -> Self {
        FieldPaths::One(Self::ALL.to_string())
    }

    /// Returns true if this mapping is the whole-payload marker.
    pub fn is_all(&self) -> bool {
        matches!(self, FieldPaths::One(p) if p == Self::ALL)
    }

    /// Candidate paths in resolution order.
    pub fn candidates(&self) -> &[String] {
        match self {
            FieldPaths::One(path) => std::slice::from_ref(path),
            FieldPaths::Many(paths) => paths,
        }
    }
}

/// Dot-path mappings from payload fields to logical event fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMappings {
    /// Paths tried for the event name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<FieldPaths>,
    /// Paths tried for the event timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<FieldPaths>,
    /// Paths tried for the user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<FieldPaths>,
    /// Path to the properties object, or the `all` marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<FieldPaths>,
}

/// Values pulled out of a payload via [`FieldMappings::extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    /// Resolved event name value.
    pub event_name: Option<Value>,
    /// Resolved timestamp value.
    pub timestamp: Option<Value>,
    /// Resolved user id value.
    pub user_id: Option<Value>,
    /// Resolved properties value (the whole payload for the `all` marker).
    pub properties: Option<Value>,
}

impl FieldMappings {
    /// Returns true if no field has a mapping.
    pub fn is_empty(&self) -> bool {
        self.event_name.is_none()
            && self.timestamp.is_none()
            && self.user_id.is_none()
            && self.properties.is_none()
    }

    /// Resolves each mapped field against a payload.
    ///
    /// For every field the candidate paths are tried in order and the first
    /// present non-null value wins. The `all` properties marker yields the
    /// entire payload.
    pub fn extract(&self, payload: &Value) -> ExtractedFields {
        let properties = match &self.properties {
            Some(paths) if paths.is_all() => Some(payload.clone()),
            Some(paths) => resolve(paths, payload),
            None => None,
        };

        ExtractedFields {
            event_name: self.event_name.as_ref().and_then(|p| resolve(p, payload)),
            timestamp: self.timestamp.as_ref().and_then(|p| resolve(p, payload)),
            user_id: self.user_id.as_ref().and_then(|p| resolve(p, payload)),
            properties,
        }
    }
}

fn resolve(paths: &FieldPaths, payload: &Value) -> Option<Value> {
    paths
        .candidates()
        .iter()
        .find_map(|path| get_path(payload, path).cloned())
}

// =============================================================================
// Parser Kinds
// =============================================================================

/// Parser strategy declared by a source.
///
/// Serialized values outside this set deserialize as [`ParserKind::Generic`],
/// so stale or hand-edited definitions degrade instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Batch/track envelopes: `{batch: [...]}` or a single track call.
    Batch,
    /// Measurement-protocol payloads: JSON events array or query string.
    Measurement,
    /// Flat event objects with every top-level field kept as a property.
    FlatEvent,
    /// GraphQL envelopes carrying analytics variables.
    Graphql,
    /// Field-mapping driven extraction.
    #[default]
    #[serde(other)]
    Generic,
}

impl ParserKind {
    /// Returns the parser kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Batch => "batch",
            ParserKind::Measurement => "measurement",
            ParserKind::FlatEvent => "flat_event",
            ParserKind::Graphql => "graphql",
            ParserKind::Generic => "generic",
        }
    }

    /// Parses a parser kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "batch" => Some(ParserKind::Batch),
            "measurement" => Some(ParserKind::Measurement),
            "flat_event" => Some(ParserKind::FlatEvent),
            "graphql" => Some(ParserKind::Graphql),
            "generic" => Some(ParserKind::Generic),
            _ => None,
        }
    }
}

/// Who created a source definition.
///
/// Records without an explicit provenance (hand-written imports, mostly)
/// count as user sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Bundled with the application.
    System,
    /// Added or imported by the user.
    #[default]
    User,
}

impl Provenance {
    /// Returns the provenance name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::System => "system",
            Provenance::User => "user",
        }
    }

    /// Parses a provenance from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "system" => Some(Provenance::System),
            "user" => Some(Provenance::User),
            _ => None,
        }
    }
}

// =============================================================================
// Source
// =============================================================================

/// Capture statistics for a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceStats {
    /// Number of events captured for this source.
    pub capture_count: u64,
    /// When this source last produced an event.
    pub last_captured_at: Option<DateTime<Utc>>,
}

/// Default display icon for sources without one.
pub const DEFAULT_ICON: &str = "📊";

/// Palette used to derive a stable color from a source id.
const COLOR_PALETTE: [&str; 8] = [
    "#6366F1", // Indigo
    "#8B5CF6", // Purple
    "#EC4899", // Pink
    "#F59E0B", // Amber
    "#10B981", // Emerald
    "#3B82F6", // Blue
    "#EF4444", // Red
    "#14B8A6", // Teal
];

/// Picks a deterministic display color from a hash of the source id.
pub fn color_for_id(id: &str) -> &'static str {
    let hash: usize = id.bytes().map(|b| b as usize).sum();
    COLOR_PALETTE[hash % COLOR_PALETTE.len()]
}

/// An analytics destination definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Unique, stable identifier.
    pub id: String,
    /// Human-friendly display name.
    #[serde(default)]
    pub name: String,
    /// Whether this source participates in URL matching.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Display color (hex).
    #[serde(default)]
    pub color: String,
    /// Display icon.
    #[serde(default)]
    pub icon: String,
    /// URL patterns, checked in order.
    #[serde(default)]
    pub url_patterns: Vec<UrlPattern>,
    /// Dot-path mappings used by the generic parser.
    #[serde(default)]
    pub field_mappings: FieldMappings,
    /// Parser strategy for matched payloads.
    #[serde(default)]
    pub parser: ParserKind,
    /// Who created this definition.
    #[serde(default)]
    pub created_by: Provenance,
    /// When this definition was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Capture statistics.
    #[serde(default)]
    pub stats: SourceStats,
}

fn default_enabled() -> bool {
    true
}

impl Source {
    /// Creates an enabled source with defaults derived from the id.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let color = color_for_id(&id).to_string();
        Self {
            id,
            name: name.into(),
            enabled: true,
            color,
            icon: DEFAULT_ICON.to_string(),
            url_patterns: Vec::new(),
            field_mappings: FieldMappings::default(),
            parser: ParserKind::default(),
            created_by: Provenance::default(),
            created_at: Utc::now(),
            stats: SourceStats::default(),
        }
    }

    /// Creates a bundled system source.
    ///
    /// System sources carry a fixed creation time so a definition only
    /// differs from its bundled form when the user actually changed it.
    pub fn system(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut source = Self::new(id, name);
        source.created_by = Provenance::System;
        source.created_at = DateTime::UNIX_EPOCH;
        source
    }

    /// Creates a user source.
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut source = Self::new(id, name);
        source.created_by = Provenance::User;
        source
    }

    /// Sets the display color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Sets the display icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Adds a URL pattern.
    pub fn with_pattern(mut self, pattern: UrlPattern) -> Self {
        self.url_patterns.push(pattern);
        self
    }

    /// Replaces the URL pattern list.
    pub fn with_patterns(mut self, patterns: Vec<UrlPattern>) -> Self {
        self.url_patterns = patterns;
        self
    }

    /// Sets the field mappings.
    pub fn with_mappings(mut self, mappings: FieldMappings) -> Self {
        self.field_mappings = mappings;
        self
    }

    /// Sets the parser strategy.
    pub fn with_parser(mut self, parser: ParserKind) -> Self {
        self.parser = parser;
        self
    }

    /// Tests whether any pattern matches the URL.
    ///
    /// A disabled source never matches.
    pub fn matches_url(&self, url: &str) -> bool {
        self.enabled && self.url_patterns.iter().any(|p| p.matches(url))
    }

    /// Records one captured event against this source's statistics.
    pub fn record_capture(&mut self) {
        self.stats.capture_count += 1;
        self.stats.last_captured_at = Some(Utc::now());
    }

    /// Fills defaults a deserialized record may be missing.
    pub fn normalize(&mut self) {
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if self.color.is_empty() {
            self.color = color_for_id(&self.id).to_string();
        }
        if self.icon.is_empty() {
            self.icon = DEFAULT_ICON.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== Pattern Tests ====================

    #[test]
    fn test_contains_pattern_case_insensitive() {
        let pattern = UrlPattern::contains("Segment.io/v1/");
        assert!(pattern.matches("https://api.SEGMENT.io/v1/batch"));
        assert!(!pattern.matches("https://example.com/v2/batch"));
    }

    #[test]
    fn test_exact_pattern() {
        let pattern = UrlPattern::exact("https://example.com/track");
        assert!(pattern.matches("https://example.com/track"));
        // Exact patterns are byte-for-byte, not case-folded.
        assert!(!pattern.matches("https://EXAMPLE.com/track"));
        assert!(!pattern.matches("https://example.com/track?x=1"));
    }

    #[test]
    fn test_regex_pattern_case_insensitive() {
        let pattern = UrlPattern::regex(r"/v\d+/(batch|track)$");
        assert!(pattern.matches("https://api.example.com/v1/BATCH"));
        assert!(pattern.matches("https://api.example.com/v2/track"));
        assert!(!pattern.matches("https://api.example.com/v1/identify"));
    }

    #[test]
    fn test_malformed_regex_never_matches() {
        let pattern = UrlPattern::regex("([unclosed");
        assert!(!pattern.matches("https://example.com/([unclosed"));
    }

    #[test]
    fn test_validate_rejects_malformed_regex() {
        assert!(UrlPattern::regex("([unclosed").validate().is_err());
        assert!(UrlPattern::regex(r"/v\d+/").validate().is_ok());
        assert!(UrlPattern::contains("").validate().is_err());
    }

    #[test]
    fn test_pattern_serde_uses_type_key() {
        let pattern = UrlPattern::contains("reddit.com/events");
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["type"], "contains");

        let parsed: UrlPattern =
            serde_json::from_value(json!({"pattern": "/collect", "type": "regex"})).unwrap();
        assert_eq!(parsed.kind, PatternType::Regex);
    }

    // ==================== Source Matching Tests ====================

    #[test]
    fn test_source_matches_any_pattern() {
        let source = Source::system("segment", "Segment")
            .with_pattern(UrlPattern::contains("segment.io/v1/"))
            .with_pattern(UrlPattern::contains("/v1/batch"));

        assert!(source.matches_url("https://api.segment.io/v1/track"));
        assert!(source.matches_url("https://proxy.internal/v1/batch"));
        assert!(!source.matches_url("https://example.com/other"));
    }

    #[test]
    fn test_disabled_source_never_matches() {
        let mut source =
            Source::system("segment", "Segment").with_pattern(UrlPattern::contains("segment.io"));
        source.enabled = false;

        assert!(!source.matches_url("https://api.segment.io/v1/track"));
    }

    #[test]
    fn test_record_capture_updates_stats() {
        let mut source = Source::system("segment", "Segment");
        assert_eq!(source.stats.capture_count, 0);
        assert!(source.stats.last_captured_at.is_none());

        source.record_capture();
        source.record_capture();

        assert_eq!(source.stats.capture_count, 2);
        assert!(source.stats.last_captured_at.is_some());
    }

    // ==================== Field Mapping Tests ====================

    #[test]
    fn test_extract_tries_candidates_in_order() {
        let mappings = FieldMappings {
            event_name: Some(FieldPaths::many(["event", "type"])),
            ..Default::default()
        };

        let payload = json!({"type": "page_view"});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.event_name, Some(json!("page_view")));

        let payload = json!({"event": "click", "type": "page_view"});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.event_name, Some(json!("click")));
    }

    #[test]
    fn test_extract_skips_null_candidates() {
        let mappings = FieldMappings {
            user_id: Some(FieldPaths::many(["user_id", "anonymous_id"])),
            ..Default::default()
        };

        let payload = json!({"user_id": null, "anonymous_id": "anon-1"});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.user_id, Some(json!("anon-1")));
    }

    #[test]
    fn test_extract_dot_path() {
        let mappings = FieldMappings {
            user_id: Some(FieldPaths::one("user.id")),
            ..Default::default()
        };

        let payload = json!({"user": {"id": "u-17"}});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.user_id, Some(json!("u-17")));
    }

    #[test]
    fn test_extract_all_properties_marker() {
        let mappings = FieldMappings {
            properties: Some(FieldPaths::all()),
            ..Default::default()
        };

        let payload = json!({"a": 1, "b": {"c": 2}});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.properties, Some(payload));
    }

    #[test]
    fn test_extract_properties_single_path() {
        let mappings = FieldMappings {
            properties: Some(FieldPaths::one("event_properties")),
            ..Default::default()
        };

        let payload = json!({"event_properties": {"plan": "pro"}, "other": 1});
        let extracted = mappings.extract(&payload);
        assert_eq!(extracted.properties, Some(json!({"plan": "pro"})));
    }

    #[test]
    fn test_mappings_serde_shapes() {
        // Single-string and list shapes both deserialize.
        let mappings: FieldMappings = serde_json::from_value(json!({
            "eventName": ["event", "type"],
            "properties": "all"
        }))
        .unwrap();

        assert_eq!(mappings.event_name, Some(FieldPaths::many(["event", "type"])));
        assert!(mappings.properties.as_ref().unwrap().is_all());
        assert!(mappings.timestamp.is_none());
    }

    // ==================== Parser Kind Tests ====================

    #[test]
    fn test_parser_kind_roundtrip() {
        for kind in [
            ParserKind::Batch,
            ParserKind::Measurement,
            ParserKind::FlatEvent,
            ParserKind::Graphql,
            ParserKind::Generic,
        ] {
            assert_eq!(ParserKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_unrecognized_parser_kind_deserializes_as_generic() {
        let kind: ParserKind = serde_json::from_value(json!("segment-legacy")).unwrap();
        assert_eq!(kind, ParserKind::Generic);
    }

    #[test]
    fn test_parser_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ParserKind::FlatEvent).unwrap(),
            json!("flat_event")
        );
    }

    // ==================== Serde Defaults Tests ====================

    #[test]
    fn test_source_deserializes_with_minimal_fields() {
        let mut source: Source = serde_json::from_value(json!({
            "id": "myapp-com",
            "urlPatterns": [{"pattern": "myapp.com", "type": "contains"}]
        }))
        .unwrap();
        source.normalize();

        assert!(source.enabled);
        assert_eq!(source.name, "myapp-com");
        assert_eq!(source.parser, ParserKind::Generic);
        assert_eq!(source.created_by, Provenance::User);
        assert_eq!(source.color, color_for_id("myapp-com"));
        assert_eq!(source.icon, DEFAULT_ICON);
    }

    #[test]
    fn test_color_for_id_is_deterministic() {
        assert_eq!(color_for_id("segment"), color_for_id("segment"));
        assert!(COLOR_PALETTE.contains(&color_for_id("anything")));
    }
}
