//! Reconciliation engine for granary.
//!
//! A pass runs these stages over one collection:
//! - [`discovery`]: classify listed objects into granule records and legacy keys
//! - dedup persistence through a [`granary_index::GranuleIndex`]
//! - [`backfill`]: look up and upload JSON metadata for granules missing it
//! - [`cleanup`]: batch-delete superseded legacy objects
//!
//! [`Reconciler`] wires them together; [`report`] receives backfilled entries.

pub mod backfill;
pub mod cleanup;
pub mod cmr;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod report;

pub use backfill::{BackfillEngine, BackfillOutcome, BackfillResult};
pub use cleanup::{Cleanup, CleanupOutcome};
pub use cmr::{CmrClient, LookupOutcome, MetadataSource};
pub use discovery::{Discovery, LegacyObject, discover};
pub use error::{EngineError, EngineResult};
pub use pipeline::{Reconciler, RunSummary};
pub use report::{CsvReport, ReportEntry, ReportSink};
