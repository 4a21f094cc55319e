//! Persisted deduplication index for granary.
//!
//! This crate provides:
//! - The [`GranuleIndex`] trait with skip, replace, and error insert policies
//! - Batched lookups and deletes that respect SQLite's bound-parameter ceiling
//! - [`SqliteIndex`], a WAL-mode single-writer implementation

pub mod chunking;
pub mod error;
pub mod models;
pub mod store;

pub use chunking::{SQLITE_VAR_LIMIT, batch_capacity};
pub use error::{IndexError, IndexResult};
pub use store::{GranuleIndex, InsertOutcome, SqliteIndex};

use granary_core::config::IndexConfig;
use std::sync::Arc;

/// Open the index described by configuration.
pub async fn from_config(config: &IndexConfig) -> IndexResult<Arc<dyn GranuleIndex>> {
    config.validate().map_err(IndexError::Config)?;
    let index = SqliteIndex::open(&config.path, config.busy_timeout()).await?;
    Ok(Arc::new(index) as Arc<dyn GranuleIndex>)
}
