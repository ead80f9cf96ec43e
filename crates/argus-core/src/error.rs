//! Core error types.

use thiserror::Error;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Import text was not a valid JSON array of source records.
    #[error("failed to import sources: {0}")]
    Import(#[source] serde_json::Error),

    /// A URL pattern failed validation.
    #[error("invalid {kind} pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern type name (contains, regex, exact).
        kind: &'static str,
        /// The offending pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
