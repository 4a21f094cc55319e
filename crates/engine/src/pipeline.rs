//! The reconciliation pass: discovery, dedup persistence, backfill, cleanup.

use crate::backfill::{BackfillEngine, BackfillOutcome};
use crate::cleanup::Cleanup;
use crate::cmr::MetadataSource;
use crate::discovery::discover;
use crate::error::{EngineError, EngineResult};
use crate::report::{ReportEntry, ReportSink};
use granary_core::GranuleRecord;
use granary_core::config::{CollectionConfig, ReconcileConfig};
use granary_index::GranuleIndex;
use granary_storage::{ListingOptions, ObjectStore};
use std::sync::Arc;
use tracing::instrument;

/// Counts and final state of one pass.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub discovered: usize,
    pub legacy_keys: usize,
    pub malformed_keys: usize,
    pub index_written: u64,
    pub index_skipped: u64,
    pub backfilled: usize,
    pub no_hits: usize,
    pub lookup_failures: usize,
    pub upload_failures: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    pub not_superseded: usize,
    /// Every granule record after the pass, in name order.
    pub records: Vec<GranuleRecord>,
}

impl RunSummary {
    /// Nothing was backfilled or deleted.
    pub fn is_noop(&self) -> bool {
        self.backfilled == 0 && self.deleted == 0
    }
}

/// Wires the stages of a pass over one collection.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn GranuleIndex>,
    source: Arc<dyn MetadataSource>,
    report: Arc<dyn ReportSink>,
    collection: CollectionConfig,
    settings: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn GranuleIndex>,
        source: Arc<dyn MetadataSource>,
        report: Arc<dyn ReportSink>,
        collection: CollectionConfig,
        settings: ReconcileConfig,
    ) -> EngineResult<Self> {
        collection.validate().map_err(EngineError::Config)?;
        settings.validate().map_err(EngineError::Config)?;
        Ok(Self {
            store,
            index,
            source,
            report,
            collection,
            settings,
        })
    }

    /// Run one pass.
    ///
    /// Index integrity errors (duplicate records under the error policy, an unavailable
    /// index) and report write failures propagate. Per-granule lookup, upload, and delete
    /// failures are counted in the summary instead.
    #[instrument(skip(self), fields(
        short_name = %self.collection.short_name,
        version = %self.collection.version,
        policy = %self.settings.dedup_policy,
    ))]
    pub async fn run(&self) -> EngineResult<RunSummary> {
        let collection_path = self.collection.path();
        let discovery = discover(
            self.store.as_ref(),
            &collection_path,
            ListingOptions::new(self.settings.page_size),
        )
        .await?;
        let mut records = discovery.records;

        let mut summary = RunSummary {
            discovered: records.len(),
            legacy_keys: discovery.legacy.len(),
            malformed_keys: discovery.malformed,
            ..RunSummary::default()
        };

        let inserted = self
            .index
            .insert(self.settings.dedup_policy, &records.to_records())
            .await?;
        summary.index_written = inserted.written;
        summary.index_skipped = inserted.skipped;
        tracing::info!(
            written = inserted.written,
            skipped = inserted.skipped,
            "Persisted discovered granules"
        );

        let engine = BackfillEngine::new(
            self.source.clone(),
            self.store.clone(),
            self.collection.short_name.clone(),
            collection_path,
            self.settings.max_concurrency,
        );
        let missing = records.missing_json();
        let mut backfill = BackfillOutcome::default();
        for (batch_number, batch) in missing.chunks(self.settings.batch_size).enumerate() {
            tracing::info!(batch = batch_number + 1, granules = batch.len(), "Backfilling batch");
            let outcome = engine.run(&mut records, batch).await;

            self.index.insert_replace(&records.records_for(batch)).await?;

            let entries: Vec<ReportEntry> =
                outcome.backfilled.iter().map(ReportEntry::from).collect();
            self.report.append(&entries).await?;

            backfill.merge(outcome);
        }
        summary.backfilled = backfill.backfilled.len();
        summary.no_hits = backfill.no_hits.len();
        summary.lookup_failures = backfill.lookup_failures.len();
        summary.upload_failures = backfill.upload_failures.len();

        let cleanup = Cleanup::new(self.store.clone(), self.settings.cleanup)
            .run(&discovery.legacy, &mut records)
            .await;
        if !cleanup.cleared.is_empty() {
            self.index
                .insert_replace(&records.records_for(&cleanup.cleared))
                .await?;
        }
        summary.deleted = cleanup.deleted;
        summary.delete_failures = cleanup.failed;
        summary.not_superseded = cleanup.not_superseded;

        summary.records = records.into_records();
        tracing::info!(
            discovered = summary.discovered,
            backfilled = summary.backfilled,
            deleted = summary.deleted,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }
}
