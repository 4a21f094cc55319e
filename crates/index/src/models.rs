//! Database models mapping to the index schema.

use granary_core::GranuleRecord;
use sqlx::FromRow;

/// One row of the `granules` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GranuleRow {
    pub base_name: String,
    pub xml_exists: bool,
    pub json_exists: bool,
    /// Size of the JSON metadata object in bytes.
    pub json_file_size: i64,
}

impl From<&GranuleRecord> for GranuleRow {
    fn from(record: &GranuleRecord) -> Self {
        Self {
            base_name: record.base_name.clone(),
            xml_exists: record.xml_exists,
            json_exists: record.json_exists,
            json_file_size: i64::try_from(record.json_file_size).unwrap_or(i64::MAX),
        }
    }
}

impl From<GranuleRow> for GranuleRecord {
    fn from(row: GranuleRow) -> Self {
        Self {
            base_name: row.base_name,
            xml_exists: row.xml_exists,
            json_exists: row.json_exists,
            json_file_size: u64::try_from(row.json_file_size).unwrap_or(0),
        }
    }
}
