pub mod mocks;

#[allow(unused_imports)]
pub use mocks::{MemoryReport, MemoryStore, StubSource};

use granary_core::GranuleRecord;

#[allow(dead_code)]
pub fn record(name: &str, xml: bool, json: bool, size: u64) -> GranuleRecord {
    GranuleRecord {
        base_name: name.to_string(),
        xml_exists: xml,
        json_exists: json,
        json_file_size: size,
    }
}
