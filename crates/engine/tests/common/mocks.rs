use async_trait::async_trait;
use bytes::Bytes;
use granary_engine::{EngineError, EngineResult, LookupOutcome, MetadataSource, ReportEntry, ReportSink};
use granary_storage::{
    DeleteFailure, DeleteReport, ListingOptions, ListingPage, MAX_DELETE_BATCH, ObjectEntry,
    ObjectStore, PageStream, StorageError, StorageResult,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory object store that counts calls.
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    /// Keys whose upload fails.
    pub failing_puts: Mutex<HashSet<String>>,
    /// Keys the store refuses to delete.
    pub failing_deletes: Mutex<HashSet<String>>,
    pub put_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<'a>(objects: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        let store = Self::new();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, size) in objects {
                map.insert(key.to_string(), Bytes::from(vec![b'x'; size]));
            }
        }
        store
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(key.to_string(), data.into());
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let page_size = options.normalized_page_size();
        let entries: Vec<ObjectEntry> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectEntry::new(key.clone(), data.len() as u64))
            .collect();

        let pages: Vec<StorageResult<ListingPage>> = entries
            .chunks(page_size)
            .map(|chunk| {
                Ok(ListingPage {
                    objects: chunk.to_vec(),
                })
            })
            .collect();
        Box::pin(futures::stream::iter(pages))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(StorageError::Config(format!("injected put failure: {key}")));
        }
        self.insert(key, data);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<DeleteReport> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::DeleteBatchTooLarge {
                requested: keys.len(),
                limit: MAX_DELETE_BATCH,
            });
        }

        let failing = self.failing_deletes.lock().unwrap().clone();
        let mut objects = self.objects.lock().unwrap();
        let mut report = DeleteReport::default();
        for key in keys {
            if failing.contains(key) {
                report.failed.push(DeleteFailure {
                    key: key.clone(),
                    message: "AccessDenied".to_string(),
                });
            } else {
                objects.remove(key);
                report.deleted.push(key.clone());
            }
        }
        Ok(report)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Metadata source answering from a fixed table. Unknown granules get no hits.
#[derive(Default)]
#[allow(dead_code)]
pub struct StubSource {
    found: HashMap<String, Value>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    pub lookups: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn found(mut self, granule: &str, umm: Value) -> Self {
        self.found.insert(granule.to_string(), umm);
        self
    }

    pub fn failing(mut self, granule: &str) -> Self {
        self.failing.insert(granule.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for StubSource {
    async fn lookup(&self, _short_name: &str, granule_ur: &str) -> EngineResult<LookupOutcome> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(granule_ur) {
            return Err(EngineError::RemoteLookup {
                granule: granule_ur.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(match self.found.get(granule_ur) {
            Some(umm) => LookupOutcome::Found(umm.clone()),
            None => LookupOutcome::NoHits,
        })
    }
}

/// Report sink that keeps every appended entry.
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryReport {
    pub entries: Mutex<Vec<ReportEntry>>,
    pub appends: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryReport {
    pub fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.filename.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ReportSink for MemoryReport {
    async fn append(&self, entries: &[ReportEntry]) -> EngineResult<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().extend_from_slice(entries);
        Ok(())
    }
}
