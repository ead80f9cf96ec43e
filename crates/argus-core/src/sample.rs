//! Source creation from a sample capture.
//!
//! Given a URL and one example payload, derives a plausible source
//! definition: id and name from the host, field mappings guessed by
//! probing common field names, and an icon picked by hostname keyword.

use serde_json::Value;

use crate::paths::has_path;
use crate::source::{FieldMappings, FieldPaths, Source, UrlPattern};

/// Field names commonly carrying the event name, in preference order.
pub const EVENT_NAME_CANDIDATES: &[&str] = &[
    "event",
    "eventName",
    "event_name",
    "name",
    "type",
    "action",
    "eventType",
    "event_type",
];

/// Field names commonly carrying the event timestamp, in preference order.
pub const TIMESTAMP_CANDIDATES: &[&str] = &[
    "timestamp",
    "time",
    "ts",
    "sentAt",
    "sent_at",
    "client_timestamp",
    "event_timestamp",
    "created_at",
];

/// Field names commonly carrying a user id, in preference order.
pub const USER_ID_CANDIDATES: &[&str] = &[
    "user_id",
    "userId",
    "uid",
    "user.id",
    "anonymous_id",
    "anonymousId",
    "distinct_id",
];

const ICON_KEYWORDS: &[(&str, &str)] = &[
    ("reddit", "🔵"),
    ("segment", "📊"),
    ("google", "📈"),
    ("mixpanel", "🔮"),
    ("amplitude", "📡"),
    ("facebook", "📘"),
    ("twitter", "🐦"),
    ("linkedin", "💼"),
    ("github", "🐙"),
    ("analytics", "📊"),
    ("track", "📍"),
    ("api", "⚡"),
];

/// Derives a user source from one sampled request.
///
/// Returns `None` when the URL carries no usable host.
pub fn source_from_sample(url: &str, payload: &Value) -> Option<Source> {
    let host = host_of(url)?;

    let id = host.replace('.', "-");
    let source = Source::user(id, humanize_domain(&host))
        .with_icon(icon_for_host(&host))
        .with_pattern(UrlPattern::contains(&host))
        .with_mappings(guess_mappings(payload));

    Some(source)
}

/// Guesses field mappings by probing the payload for common field names.
///
/// Every candidate present in the payload is kept, preserving preference
/// order, so the extractor can fall through shapes that vary per event.
pub fn guess_mappings(payload: &Value) -> FieldMappings {
    let probe = |candidates: &[&str]| {
        FieldPaths::many(
            candidates
                .iter()
                .filter(|path| has_path(payload, path))
                .copied(),
        )
    };

    FieldMappings {
        event_name: Some(probe(EVENT_NAME_CANDIDATES)),
        timestamp: Some(probe(TIMESTAMP_CANDIDATES)),
        user_id: Some(probe(USER_ID_CANDIDATES)),
        properties: Some(FieldPaths::all()),
    }
}

/// Extracts the lowercased host from a URL, without port or path.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Turns a hostname into a display name: TLD stripped, words capitalized.
pub fn humanize_domain(host: &str) -> String {
    let trimmed = ["com", "org", "io", "co", "net"]
        .iter()
        .find_map(|tld| host.strip_suffix(&format!(".{tld}")))
        .unwrap_or(host);

    trimmed
        .split(['.', '-'])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Picks a display icon by keyword match against the hostname.
pub fn icon_for_host(host: &str) -> &'static str {
    let host = host.to_lowercase();
    ICON_KEYWORDS
        .iter()
        .find(|(keyword, _)| host.contains(keyword))
        .map(|(_, icon)| *icon)
        .unwrap_or(crate::source::DEFAULT_ICON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ParserKind, Provenance};
    use serde_json::json;

    // ==================== Host Parsing Tests ====================

    #[test]
    fn test_host_of_strips_path_query_and_port() {
        assert_eq!(host_of("https://API.myapp.io/v1/events?x=1"), Some("api.myapp.io".into()));
        assert_eq!(host_of("http://localhost:8889/events"), Some("localhost".into()));
        assert_eq!(host_of("https://a.b.c#frag"), Some("a.b.c".into()));
    }

    #[test]
    fn test_host_of_rejects_unusable_urls() {
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("https:///missing-host"), None);
        assert_eq!(host_of(""), None);
    }

    // ==================== Naming Tests ====================

    #[test]
    fn test_humanize_domain() {
        assert_eq!(humanize_domain("api.myapp.io"), "Api Myapp");
        assert_eq!(humanize_domain("my-cool-site.com"), "My Cool Site");
        assert_eq!(humanize_domain("internal"), "Internal");
    }

    #[test]
    fn test_icon_for_host_keywords() {
        assert_eq!(icon_for_host("events.reddit.com"), "🔵");
        assert_eq!(icon_for_host("api.example.com"), "⚡");
        assert_eq!(icon_for_host("unknown.example"), "📊");
    }

    // ==================== Mapping Guess Tests ====================

    #[test]
    fn test_guess_keeps_every_present_candidate() {
        let payload = json!({
            "event": "click",
            "type": "interaction",
            "timestamp": 1700000000,
            "user": {"id": "u-1"},
            "distinct_id": null
        });

        let mappings = guess_mappings(&payload);
        assert_eq!(
            mappings.event_name,
            Some(FieldPaths::many(["event", "type"]))
        );
        assert_eq!(mappings.timestamp, Some(FieldPaths::many(["timestamp"])));
        // Presence probing counts nulls and dot-paths.
        assert_eq!(
            mappings.user_id,
            Some(FieldPaths::many(["user.id", "distinct_id"]))
        );
        assert!(mappings.properties.unwrap().is_all());
    }

    // ==================== Sample Source Tests ====================

    #[test]
    fn test_source_from_sample() {
        let payload = json!({"event": "signup", "ts": 1700000000});
        let source = source_from_sample("https://events.myapp.io/v2/collect", &payload).unwrap();

        assert_eq!(source.id, "events-myapp-io");
        assert_eq!(source.name, "Events Myapp");
        assert_eq!(source.created_by, Provenance::User);
        assert_eq!(source.parser, ParserKind::Generic);
        assert!(source.enabled);
        assert!(source.matches_url("https://events.myapp.io/v2/collect"));
        assert!(!source.color.is_empty());
    }

    #[test]
    fn test_source_from_sample_bad_url() {
        assert!(source_from_sample("garbage", &json!({})).is_none());
    }
}
