//! Core domain types and shared logic for granary.
//!
//! This crate defines the data model used across all other crates:
//! - Granule records and their order-independent merge rules
//! - Classification of object keys into granule metadata kinds
//! - Run configuration (collection, storage, index, CMR, reconcile policy)

pub mod config;
pub mod error;
pub mod granule;
pub mod key;

pub use config::{AppConfig, CleanupMode, CollectionConfig, DedupPolicy, Environment};
pub use error::{Error, Result};
pub use granule::{GranuleMap, GranuleRecord};
pub use key::{ClassifiedKey, MetadataSuffix, classify_key};

/// Bytes per reported kilobyte. Sizes are tracked in bytes and reported in kilobytes.
pub const BYTES_PER_KB: f64 = 1000.0;

/// Convert a byte count into the kilobyte figure used in reports.
pub fn bytes_to_kb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_KB
}
