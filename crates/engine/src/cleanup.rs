//! Cleanup: batch-delete legacy XML objects once they are superseded.

use crate::discovery::LegacyObject;
use granary_core::{CleanupMode, GranuleMap};
use granary_storage::{MAX_DELETE_BATCH, ObjectStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Counts from one cleanup run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Keys the store reported as deleted (absent keys included).
    pub deleted: usize,
    /// Keys the store refused to delete, or whose batch call failed outright.
    pub failed: usize,
    /// Legacy keys left in place because their granule has no JSON metadata yet.
    pub not_superseded: usize,
    /// Batch delete calls issued.
    pub delete_calls: usize,
    /// Granules whose every legacy object is now gone.
    pub cleared: Vec<String>,
}

/// Deletes legacy objects in batches of at most [`MAX_DELETE_BATCH`] keys.
pub struct Cleanup {
    store: Arc<dyn ObjectStore>,
    mode: CleanupMode,
}

impl Cleanup {
    pub fn new(store: Arc<dyn ObjectStore>, mode: CleanupMode) -> Self {
        Self { store, mode }
    }

    /// Whether a legacy object may be deleted given the current records.
    pub fn is_eligible(&self, object: &LegacyObject, records: &GranuleMap) -> bool {
        match self.mode {
            CleanupMode::Aggressive => true,
            CleanupMode::Superseded => records
                .get(&object.base_name)
                .is_some_and(|record| record.json_exists),
        }
    }

    /// Delete eligible legacy objects and clear `xml_exists` on granules left with none.
    ///
    /// Batch failures are logged and counted; they never abort the run.
    pub async fn run(&self, legacy: &[LegacyObject], records: &mut GranuleMap) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        let current: &GranuleMap = records;
        let (eligible, skipped): (Vec<&LegacyObject>, Vec<&LegacyObject>) = legacy
            .iter()
            .partition(|object| self.is_eligible(object, current));
        outcome.not_superseded = skipped.len();
        for object in &skipped {
            tracing::debug!(key = %object.key, granule = %object.base_name, "Keeping legacy object without JSON replacement");
        }

        let mut deleted_keys: HashSet<String> = HashSet::new();
        for batch in eligible.chunks(MAX_DELETE_BATCH) {
            let keys: Vec<String> = batch.iter().map(|object| object.key.clone()).collect();
            outcome.delete_calls += 1;

            match self.store.delete_many(&keys).await {
                Ok(report) => {
                    for failure in &report.failed {
                        tracing::warn!(key = %failure.key, error = %failure.message, "Failed to delete legacy object");
                    }
                    outcome.failed += report.failed.len();
                    outcome.deleted += report.deleted.len();
                    deleted_keys.extend(report.deleted);
                }
                Err(e) => {
                    tracing::warn!(keys = keys.len(), error = %e, "Legacy delete batch failed");
                    outcome.failed += keys.len();
                }
            }
        }

        // A granule is cleared only when every one of its legacy keys was deleted.
        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for object in legacy {
            let count = remaining.entry(object.base_name.as_str()).or_default();
            if !deleted_keys.contains(&object.key) {
                *count += 1;
            }
        }
        for (base_name, left) in remaining {
            if left == 0
                && let Some(record) = records.get_mut(base_name)
            {
                record.mark_legacy_removed();
                outcome.cleared.push(base_name.to_string());
            }
        }
        outcome.cleared.sort();

        tracing::info!(
            deleted = outcome.deleted,
            failed = outcome.failed,
            not_superseded = outcome.not_superseded,
            calls = outcome.delete_calls,
            "Cleanup complete"
        );
        outcome
    }
}
