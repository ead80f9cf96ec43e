//! Core types for analytics capture: source definitions, URL matching,
//! and the normalized event model.
//!
//! A [`SourceRegistry`] holds an ordered list of [`Source`] definitions.
//! Each source describes one analytics destination: URL patterns, a parser
//! strategy, and field mappings. Matching a request URL walks enabled
//! sources in registration order and short-circuits on the first hit,
//! consulting a designated fallback only when nothing else matched.
//!
//! ```
//! use argus_core::SourceRegistry;
//!
//! let registry = SourceRegistry::with_defaults();
//! let source = registry
//!     .find_for_url("https://api.segment.io/v1/track")
//!     .expect("bundled source matches");
//! assert_eq!(source.id, "segment");
//! ```

pub mod defaults;
pub mod error;
pub mod event;
pub mod paths;
pub mod registry;
pub mod sample;
pub mod source;

pub use defaults::{bundled_sources, fallback_source, FALLBACK_ID};
pub use error::{RegistryError, Result};
pub use event::{generate_id, parse_timestamp, CaptureMetadata, Event};
pub use registry::{RegistryStats, SourceRegistry};
pub use sample::source_from_sample;
pub use source::{
    ExtractedFields, FieldMappings, FieldPaths, ParserKind, PatternType, Provenance, Source,
    SourceStats, UrlPattern,
};
