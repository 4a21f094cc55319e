use granary_core::GranuleRecord;
use granary_index::SqliteIndex;
use std::time::Duration;
use tempfile::TempDir;

/// A fresh index in its own temp directory. Keep the `TempDir` alive for the test.
pub async fn temp_index() -> (TempDir, SqliteIndex) {
    let temp_dir = TempDir::new().unwrap();
    let index = SqliteIndex::open(temp_dir.path().join("granary.db"), Duration::from_secs(60))
        .await
        .unwrap();
    (temp_dir, index)
}

pub fn record(name: &str, xml: bool, json: bool, size: u64) -> GranuleRecord {
    GranuleRecord {
        base_name: name.to_string(),
        xml_exists: xml,
        json_exists: json,
        json_file_size: size,
    }
}

/// `count` distinct legacy-only records named `G00000`, `G00001`, ...
#[allow(dead_code)]
pub fn many_records(count: usize) -> Vec<GranuleRecord> {
    (0..count)
        .map(|i| record(&format!("G{i:05}"), true, false, 0))
        .collect()
}
