//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    /// An object key is not `<granule>.<metadata suffix>`. Callers log and skip these.
    #[error("malformed metadata key: {0}")]
    MalformedKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
