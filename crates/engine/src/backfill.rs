//! Backfill: produce JSON metadata objects for granules that lack one.
//!
//! Runs as two bounded concurrent stages. Every lookup in a batch completes before the
//! upload stage starts, and only granules whose lookup produced a payload are uploaded.

use crate::cmr::{LookupOutcome, MetadataSource};
use crate::error::{EngineError, EngineResult};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use granary_core::{GranuleMap, GranuleRecord, MetadataSuffix};
use granary_storage::ObjectStore;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A JSON object written by backfill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackfillResult {
    pub base_name: String,
    /// Full object key the payload was uploaded to.
    pub key: String,
    /// Payload length in bytes.
    pub size_bytes: u64,
}

impl BackfillResult {
    /// Object name without the collection path (`<base_name>.cmr.json`).
    pub fn filename(&self) -> String {
        MetadataSuffix::Json.object_name(&self.base_name)
    }
}

/// Per-batch backfill results. List order carries no meaning.
#[derive(Clone, Debug, Default)]
pub struct BackfillOutcome {
    pub backfilled: Vec<BackfillResult>,
    /// Granules the source had no metadata for.
    pub no_hits: Vec<String>,
    pub lookup_failures: Vec<String>,
    pub upload_failures: Vec<String>,
}

impl BackfillOutcome {
    pub fn merge(&mut self, other: BackfillOutcome) {
        self.backfilled.extend(other.backfilled);
        self.no_hits.extend(other.no_hits);
        self.lookup_failures.extend(other.lookup_failures);
        self.upload_failures.extend(other.upload_failures);
    }
}

struct Payload {
    base_name: String,
    key: String,
    bytes: Bytes,
}

/// Looks up and uploads JSON metadata for one collection.
pub struct BackfillEngine {
    source: Arc<dyn MetadataSource>,
    store: Arc<dyn ObjectStore>,
    short_name: String,
    collection_path: String,
    lookup_permits: Arc<Semaphore>,
    upload_permits: Arc<Semaphore>,
}

impl BackfillEngine {
    /// `collection_path` must end in `/`; uploads land at `<collection_path><base>.cmr.json`.
    /// `max_concurrency` bounds the lookup stage and, separately, the upload stage.
    pub fn new(
        source: Arc<dyn MetadataSource>,
        store: Arc<dyn ObjectStore>,
        short_name: impl Into<String>,
        collection_path: impl Into<String>,
        max_concurrency: usize,
    ) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            source,
            store,
            short_name: short_name.into(),
            collection_path: collection_path.into(),
            lookup_permits: Arc::new(Semaphore::new(permits)),
            upload_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Object key a granule's JSON payload is uploaded to.
    pub fn target_key(&self, base_name: &str) -> String {
        format!(
            "{}{}",
            self.collection_path,
            MetadataSuffix::Json.object_name(base_name)
        )
    }

    /// Backfill the named granules, updating `records` for every successful upload.
    ///
    /// Per-granule failures are logged and reported in the outcome; they never abort the
    /// batch, and the failed granule's record is left as it was.
    pub async fn run(&self, records: &mut GranuleMap, names: &[String]) -> BackfillOutcome {
        let mut outcome = BackfillOutcome::default();
        if names.is_empty() {
            return outcome;
        }

        let payloads = self.lookup_stage(names, &mut outcome).await;
        tracing::info!(
            requested = names.len(),
            payloads = payloads.len(),
            no_hits = outcome.no_hits.len(),
            lookup_failures = outcome.lookup_failures.len(),
            "Lookup stage complete"
        );

        for result in self.upload_stage(payloads, &mut outcome).await {
            match records.get_mut(&result.base_name) {
                Some(record) => record.mark_json_written(result.size_bytes),
                None => {
                    let mut record = GranuleRecord::new(result.base_name.clone());
                    record.mark_json_written(result.size_bytes);
                    records.merge_record(record);
                }
            }
            outcome.backfilled.push(result);
        }
        tracing::info!(
            backfilled = outcome.backfilled.len(),
            upload_failures = outcome.upload_failures.len(),
            "Upload stage complete"
        );

        outcome
    }

    async fn lookup_stage(&self, names: &[String], outcome: &mut BackfillOutcome) -> Vec<Payload> {
        let mut pending = FuturesUnordered::new();
        for name in names {
            let source = self.source.clone();
            let permits = self.lookup_permits.clone();
            let short_name = self.short_name.clone();
            let granule = name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::lookup(&granule, e))?;
                source.lookup(&short_name, &granule).await
            });
            let name = name.clone();
            pending.push(async move { (name, handle.await) });
        }

        let mut payloads = Vec::new();
        while let Some((name, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(EngineError::lookup(&name, format!("lookup task failed: {e}"))),
            };
            match result {
                Ok(LookupOutcome::Found(umm)) => match serde_json::to_vec(&umm) {
                    Ok(bytes) => payloads.push(Payload {
                        key: self.target_key(&name),
                        base_name: name,
                        bytes: Bytes::from(bytes),
                    }),
                    Err(e) => {
                        tracing::warn!(granule = %name, error = %e, "Failed to serialize metadata");
                        outcome.lookup_failures.push(name);
                    }
                },
                Ok(LookupOutcome::NoHits) => {
                    tracing::info!(
                        granule = %name,
                        short_name = %self.short_name,
                        "Metadata source returned no hits"
                    );
                    outcome.no_hits.push(name);
                }
                Err(e) => {
                    tracing::warn!(granule = %name, error = %e, "Metadata lookup failed");
                    outcome.lookup_failures.push(name);
                }
            }
        }
        payloads
    }

    async fn upload_stage(
        &self,
        payloads: Vec<Payload>,
        outcome: &mut BackfillOutcome,
    ) -> Vec<BackfillResult> {
        let mut pending = FuturesUnordered::new();
        for payload in payloads {
            let store = self.store.clone();
            let permits = self.upload_permits.clone();
            let key = payload.key.clone();
            let size_bytes = payload.bytes.len() as u64;

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| EngineError::Upload {
                    key: key.clone(),
                    source: granary_storage::StorageError::Config(e.to_string()),
                })?;
                store
                    .put(&key, payload.bytes)
                    .await
                    .map_err(|source| EngineError::Upload { key, source })
            });
            let result = BackfillResult {
                base_name: payload.base_name,
                key: payload.key,
                size_bytes,
            };
            pending.push(async move { (result, handle.await) });
        }

        let mut uploaded = Vec::new();
        while let Some((result, joined)) = pending.next().await {
            let status: EngineResult<()> = match joined {
                Ok(status) => status,
                Err(e) => Err(EngineError::Upload {
                    key: result.key.clone(),
                    source: granary_storage::StorageError::Config(format!(
                        "upload task failed: {e}"
                    )),
                }),
            };
            match status {
                Ok(()) => {
                    tracing::debug!(key = %result.key, size = result.size_bytes, "Uploaded JSON metadata");
                    uploaded.push(result);
                }
                Err(e) => {
                    tracing::warn!(granule = %result.base_name, error = %e, "Upload failed");
                    outcome.upload_failures.push(result.base_name);
                }
            }
        }
        uploaded
    }
}
