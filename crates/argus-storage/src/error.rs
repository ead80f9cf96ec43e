//! Storage error types.

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted document was not valid JSON.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable data directory on this platform.
    #[error("could not determine a data directory")]
    NoDataDir,
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
