//! Index error types.

use thiserror::Error;

/// Format duplicate names for display, capping at MAX_DISPLAYED to prevent log bloat.
fn format_names(names: &[String]) -> String {
    const MAX_DISPLAYED: usize = 5;
    if names.len() <= MAX_DISPLAYED {
        format!("{:?}", names)
    } else {
        let sample: Vec<_> = names.iter().take(MAX_DISPLAYED).collect();
        format!("{:?} (and {} more)", sample, names.len() - MAX_DISPLAYED)
    }
}

/// Deduplication index operation errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{} granules already indexed: {}", .names.len(), format_names(.names))]
    DuplicateRecord { names: Vec<String> },

    #[error("index unavailable at {path}: {message}")]
    Unavailable { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
