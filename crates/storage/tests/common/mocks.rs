use async_trait::async_trait;
use bytes::Bytes;
use granary_storage::error::{StorageError, StorageResult};
use granary_storage::traits::{
    DeleteReport, ListingOptions, ListingPage, MAX_DELETE_BATCH, ObjectEntry, ObjectStore,
    PageStream,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Generate a deterministic granule metadata key at the given index.
fn generate_key(i: usize) -> String {
    let suffix = if i % 2 == 0 { "cmr.xml" } else { "cmr.json" };
    format!("C__1/{:03}/G{:07}.{suffix}", i % 997, i)
}

/// Mock backend that generates synthetic keys on the fly without storing them.
#[allow(dead_code)]
pub struct MockLargeListingBackend {
    pub total_keys: usize,
}

#[allow(dead_code)]
impl MockLargeListingBackend {
    pub fn new(total_keys: usize) -> Arc<Self> {
        Arc::new(Self { total_keys })
    }
}

#[async_trait]
impl ObjectStore for MockLargeListingBackend {
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let page_size = options.normalized_page_size();
        let prefix = prefix.to_string();
        let total_keys = self.total_keys;

        Box::pin(async_stream::try_stream! {
            let mut index = 0;
            while index < total_keys {
                let end = (index + page_size).min(total_keys);
                let objects: Vec<ObjectEntry> = (index..end)
                    .map(|i| ObjectEntry::new(generate_key(i), (i as u64 % 4096) + 1))
                    .filter(|entry| entry.key.starts_with(&prefix))
                    .collect();
                index = end;
                yield ListingPage { objects };
            }
        })
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::InvalidKey(
            "mock backend is read-only".to_string(),
        ))
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<DeleteReport> {
        Ok(DeleteReport {
            deleted: keys.to_vec(),
            failed: Vec::new(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "mock-large-listing"
    }
}

/// Backend wrapper that counts pages fetched and delete calls issued.
#[allow(dead_code)]
pub struct InstrumentedBackend {
    inner: Arc<dyn ObjectStore>,
    pub pages_fetched: Arc<AtomicUsize>,
    pub delete_calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pages_fetched: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl ObjectStore for InstrumentedBackend {
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        use futures::StreamExt;

        let counter = self.pages_fetched.clone();
        Box::pin(self.inner.list_pages(prefix, options).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<DeleteReport> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        assert!(keys.len() <= MAX_DELETE_BATCH);
        self.inner.delete_many(keys).await
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
