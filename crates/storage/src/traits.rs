//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Maximum number of keys a single batch delete call accepts.
pub const MAX_DELETE_BATCH: usize = 1000;

/// A boxed stream of listing pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>>;

/// One object returned by a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// A single page of listing results.
#[derive(Clone, Debug, Default)]
pub struct ListingPage {
    /// Objects in this page, in backend order.
    pub objects: Vec<ObjectEntry>,
}

/// Options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingOptions {
    /// Number of keys to fetch per page.
    ///
    /// This value will be clamped to [MIN_PAGE_SIZE, MAX_PAGE_SIZE].
    pub page_size: usize,
}

impl ListingOptions {
    /// Create new listing options with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Get the normalized page size.
    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A key the backend refused to delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Per-key outcome of a batch delete.
///
/// Keys that did not exist are reported as deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Object store capabilities the reconciliation engine depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List objects under a prefix, returning a stream of pages.
    ///
    /// Each page holds at most the normalized page size of entries. Pages are fetched
    /// lazily as the stream is polled.
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a>;

    /// Put an object, replacing any existing object with the same key.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete up to [`MAX_DELETE_BATCH`] objects in one call.
    ///
    /// Returns a per-key report. Deleting an absent key is not a failure. Larger batches
    /// are rejected with [`crate::StorageError::DeleteBatchTooLarge`].
    async fn delete_many(&self, keys: &[String]) -> StorageResult<DeleteReport>;

    /// Get the name of this storage backend ("s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject delete batches over the backend limit.
pub(crate) fn check_delete_batch(keys: &[String]) -> StorageResult<()> {
    if keys.len() > MAX_DELETE_BATCH {
        return Err(crate::error::StorageError::DeleteBatchTooLarge {
            requested: keys.len(),
            limit: MAX_DELETE_BATCH,
        });
    }
    Ok(())
}
