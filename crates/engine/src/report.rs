//! Report sinks for backfilled granules.

use crate::backfill::BackfillResult;
use crate::error::EngineResult;
use async_trait::async_trait;
use granary_core::bytes_to_kb;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// One report row: a written JSON object and its size in kilobytes.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportEntry {
    pub filename: String,
    pub size_kb: f64,
}

impl From<&BackfillResult> for ReportEntry {
    fn from(result: &BackfillResult) -> Self {
        Self {
            filename: result.filename(),
            size_kb: bytes_to_kb(result.size_bytes),
        }
    }
}

/// Destination for report rows, appended batch by batch.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn append(&self, entries: &[ReportEntry]) -> EngineResult<()>;
}

/// Appends `filename,size_kb` rows to a CSV file, without a header.
#[derive(Clone, Debug)]
pub struct CsvReport {
    path: PathBuf,
}

impl CsvReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl ReportSink for CsvReport {
    async fn append(&self, entries: &[ReportEntry]) -> EngineResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut rows = String::new();
        for entry in entries {
            rows.push_str(&csv_field(&entry.filename));
            rows.push(',');
            rows.push_str(&entry.size_kb.to_string());
            rows.push_str("\r\n");
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(rows.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), rows = entries.len(), "Appended report rows");
        Ok(())
    }
}
