//! Engine error types.

use granary_index::IndexError;
use granary_storage::StorageError;
use thiserror::Error;

/// Reconciliation engine errors.
///
/// `RemoteLookup` and `Upload` are per-granule and recovered inside the backfill stage;
/// `Index` errors (duplicates, unavailable store) halt the pass.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metadata lookup failed for {granule}: {message}")]
    RemoteLookup { granule: String, message: String },

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("report error: {0}")]
    Report(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn lookup(granule: &str, message: impl std::fmt::Display) -> Self {
        Self::RemoteLookup {
            granule: granule.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
