//! Discovery: classify every listed object into granule records.

use crate::error::EngineResult;
use futures::StreamExt;
use granary_core::{GranuleMap, MetadataSuffix, classify_key};
use granary_storage::{ListingOptions, ObjectStore};
use tracing::instrument;

/// A legacy XML object queued for cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyObject {
    /// Full object key.
    pub key: String,
    /// Granule the object belongs to.
    pub base_name: String,
}

/// Result of one discovery pass.
#[derive(Clone, Debug, Default)]
pub struct Discovery {
    pub records: GranuleMap,
    /// Legacy objects in listing order.
    pub legacy: Vec<LegacyObject>,
    /// Keys that did not match `<granule>.<suffix>`.
    pub malformed: usize,
    /// Every key returned by the listing.
    pub objects_seen: usize,
}

/// Page through everything under `prefix` and build granule records.
///
/// Malformed keys are logged and skipped. A failed page fetch aborts discovery, since a
/// partial listing would produce an untrustworthy legacy list.
#[instrument(skip(store, options), fields(backend = store.backend_name()))]
pub async fn discover(
    store: &dyn ObjectStore,
    prefix: &str,
    options: ListingOptions,
) -> EngineResult<Discovery> {
    let mut discovery = Discovery::default();
    let mut pages = store.list_pages(prefix, options);

    while let Some(page) = pages.next().await {
        let page = page?;
        for entry in page.objects {
            discovery.objects_seen += 1;
            let classified = match classify_key(&entry.key) {
                Ok(classified) => classified,
                Err(e) => {
                    tracing::debug!(key = %entry.key, error = %e, "Skipping non-metadata object");
                    discovery.malformed += 1;
                    continue;
                }
            };

            if classified.suffix == MetadataSuffix::LegacyXml {
                discovery.legacy.push(LegacyObject {
                    key: entry.key.clone(),
                    base_name: classified.base_name.clone(),
                });
            }
            discovery.records.observe(&classified, entry.size);
        }
    }

    tracing::info!(
        objects = discovery.objects_seen,
        granules = discovery.records.len(),
        legacy = discovery.legacy.len(),
        malformed = discovery.malformed,
        "Discovery complete"
    );
    Ok(discovery)
}
