//! Bundled source definitions for popular analytics platforms.
//!
//! These load by default and can be edited, disabled, or removed by the
//! user; [`crate::registry::SourceRegistry::reset_to_defaults`] restores
//! them. The fallback source is consulted only when nothing else matches.

use crate::source::{FieldMappings, FieldPaths, ParserKind, Source, UrlPattern};

/// Id of the designated fallback source.
pub const FALLBACK_ID: &str = "fallback";

fn mappings(event_name: &[&str], timestamp: &[&str], user_id: &[&str], properties: &str) -> FieldMappings {
    FieldMappings {
        event_name: Some(FieldPaths::many(event_name.iter().copied())),
        timestamp: Some(FieldPaths::many(timestamp.iter().copied())),
        user_id: Some(FieldPaths::many(user_id.iter().copied())),
        properties: Some(FieldPaths::one(properties)),
    }
}

/// Builds the bundled platform sources, in registration order.
pub fn bundled_sources() -> Vec<Source> {
    vec![
        Source::system("reddit", "Reddit")
            .with_color("#FF4500")
            .with_icon("🔵")
            .with_pattern(UrlPattern::contains("reddit.com/events"))
            .with_pattern(UrlPattern::contains("reddit.com/svc/shreddit/events"))
            .with_mappings(mappings(
                &["action", "event", "noun"],
                &["client_timestamp", "timestamp"],
                &["user_id"],
                FieldPaths::ALL,
            ))
            .with_parser(ParserKind::FlatEvent),
        Source::system("segment", "Segment")
            .with_color("#52BD95")
            .with_icon("📊")
            .with_pattern(UrlPattern::contains("segment.io/v1/"))
            .with_pattern(UrlPattern::contains("segment.com/v1/"))
            .with_pattern(UrlPattern::contains("/v1/batch"))
            .with_pattern(UrlPattern::contains("/v1/track"))
            .with_mappings(mappings(
                &["event", "type"],
                &["timestamp", "sentAt"],
                &["userId", "anonymousId"],
                "properties",
            ))
            .with_parser(ParserKind::Batch),
        Source::system("google-analytics", "Google Analytics")
            .with_color("#F9AB00")
            .with_icon("📈")
            .with_pattern(UrlPattern::contains("google-analytics.com"))
            .with_pattern(UrlPattern::contains("analytics.google.com"))
            .with_pattern(UrlPattern::contains("/collect"))
            .with_mappings(mappings(
                &["name", "ea", "t"],
                &["timestamp"],
                &["user_id", "uid"],
                FieldPaths::ALL,
            ))
            .with_parser(ParserKind::Measurement),
        Source::system("mixpanel", "Mixpanel")
            .with_color("#7856FF")
            .with_icon("🔮")
            .with_pattern(UrlPattern::contains("mixpanel.com/track"))
            .with_pattern(UrlPattern::contains("api.mixpanel.com"))
            .with_mappings(mappings(&["event"], &["time"], &["distinct_id"], "properties")),
        Source::system("amplitude", "Amplitude")
            .with_color("#0088FF")
            .with_icon("📡")
            .with_pattern(UrlPattern::contains("amplitude.com/2/httpapi"))
            .with_pattern(UrlPattern::contains("api.amplitude.com"))
            .with_mappings(mappings(
                &["event_type"],
                &["time"],
                &["user_id", "device_id"],
                "event_properties",
            )),
        // Same envelope format as Segment.
        Source::system("pie", "Pie")
            .with_color("#FF6B6B")
            .with_icon("🥧")
            .with_pattern(UrlPattern::contains("pie.org/v1/batch"))
            .with_pattern(UrlPattern::contains("pie-staging.org/v1/batch"))
            .with_mappings(mappings(
                &["event", "type"],
                &["timestamp", "sentAt"],
                &["userId", "anonymousId"],
                "properties",
            ))
            .with_parser(ParserKind::Batch),
        Source::system("heap", "Heap")
            .with_color("#FF5A5F")
            .with_icon("🔥")
            .with_pattern(UrlPattern::contains("heapanalytics.com/api/track"))
            .with_pattern(UrlPattern::contains("heap.io/api/"))
            .with_mappings(mappings(&["event"], &["time"], &["identity"], FieldPaths::ALL)),
        Source::system("posthog", "PostHog")
            .with_color("#1D4AFF")
            .with_icon("🦔")
            .with_pattern(UrlPattern::contains("posthog.com/capture"))
            .with_pattern(UrlPattern::contains("app.posthog.com"))
            .with_mappings(mappings(&["event"], &["timestamp"], &["distinct_id"], "properties")),
        Source::system("snowplow", "Snowplow")
            .with_color("#6638F0")
            .with_icon("❄️")
            .with_pattern(UrlPattern::contains("/com.snowplowanalytics"))
            .with_pattern(UrlPattern::regex(r"/i\?"))
            .with_mappings(mappings(
                &["e", "event"],
                &["dtm", "timestamp"],
                &["uid"],
                FieldPaths::ALL,
            )),
        // Same envelope format as Segment.
        Source::system("rudderstack", "RudderStack")
            .with_color("#FF6B35")
            .with_icon("🚢")
            .with_pattern(UrlPattern::contains("rudderstack.com/v1/"))
            .with_pattern(UrlPattern::contains("/v1/track"))
            .with_pattern(UrlPattern::contains("/v1/batch"))
            .with_mappings(mappings(
                &["event", "type"],
                &["timestamp"],
                &["userId", "anonymousId"],
                "properties",
            ))
            .with_parser(ParserKind::Batch),
        Source::system("facebook-pixel", "Facebook Pixel")
            .with_color("#1877F2")
            .with_icon("📘")
            .with_pattern(UrlPattern::contains("facebook.com/tr"))
            .with_pattern(UrlPattern::contains("connect.facebook.net"))
            .with_mappings(mappings(
                &["ev", "event"],
                &["timestamp"],
                &["external_id"],
                FieldPaths::ALL,
            )),
        Source::system("intercom", "Intercom")
            .with_color("#1F8DED")
            .with_icon("💬")
            .with_pattern(UrlPattern::contains("intercom.io/ember/events"))
            .with_pattern(UrlPattern::contains("api.intercom.io"))
            .with_mappings(mappings(
                &["event_name"],
                &["created_at"],
                &["user_id"],
                "metadata",
            )),
    ]
}

/// Builds the fallback source for unrecognized analytics endpoints.
pub fn fallback_source() -> Source {
    Source::system(FALLBACK_ID, "Generic Analytics")
        .with_color("#6B7280")
        .with_icon("📊")
        .with_pattern(UrlPattern::contains("/analytics"))
        .with_pattern(UrlPattern::contains("/events"))
        .with_pattern(UrlPattern::contains("/track"))
        .with_pattern(UrlPattern::contains("/collect"))
        .with_pattern(UrlPattern::contains("/log"))
        .with_pattern(UrlPattern::contains("/beacon"))
        .with_mappings(mappings(
            &["event", "eventName", "event_name", "name", "type", "action"],
            &["timestamp", "time", "ts", "sentAt", "client_timestamp"],
            &["user_id", "userId", "uid", "distinct_id"],
            FieldPaths::ALL,
        ))
}
