//! Granule records and their merge rules.
//!
//! Listings can return the XML and JSON companions of one granule on different pages in
//! any order, so every update goes through [`GranuleRecord::merge`], which is
//! order-independent and idempotent:
//! - `xml_exists` / `json_exists` merge with logical OR and never go back to false.
//! - a non-zero `json_file_size` replaces the recorded size; zero never overwrites.
//!
//! The only downgrades are the explicit post-reconciliation transitions
//! ([`GranuleRecord::mark_legacy_removed`]).

use crate::key::{ClassifiedKey, MetadataSuffix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one logical granule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleRecord {
    /// Object key with path and metadata suffix stripped. Unique.
    pub base_name: String,
    /// A legacy XML companion was observed.
    pub xml_exists: bool,
    /// A JSON companion exists (observed or produced by backfill).
    pub json_exists: bool,
    /// JSON companion size in bytes; 0 when unknown or absent.
    pub json_file_size: u64,
}

impl GranuleRecord {
    /// A record with nothing observed yet.
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            xml_exists: false,
            json_exists: false,
            json_file_size: 0,
        }
    }

    /// The record implied by a single classified listing entry.
    pub fn from_observation(key: &ClassifiedKey, size: u64) -> Self {
        let mut record = Self::new(key.base_name.clone());
        match key.suffix {
            MetadataSuffix::LegacyXml => record.xml_exists = true,
            MetadataSuffix::Json => {
                record.json_exists = true;
                record.json_file_size = size;
            }
        }
        record
    }

    /// Fold another observation of the same granule into this record.
    pub fn merge(&mut self, other: &GranuleRecord) {
        debug_assert_eq!(self.base_name, other.base_name);
        self.xml_exists |= other.xml_exists;
        self.json_exists |= other.json_exists;
        if other.json_file_size != 0 {
            self.json_file_size = other.json_file_size;
        }
    }

    /// Record a JSON companion produced by backfill.
    pub fn mark_json_written(&mut self, size: u64) {
        self.json_exists = true;
        self.json_file_size = size;
    }

    /// Record that every legacy XML companion of this granule has been deleted.
    pub fn mark_legacy_removed(&mut self) {
        self.xml_exists = false;
    }

    /// Whether the granule still lacks a JSON companion.
    pub fn needs_json(&self) -> bool {
        !self.json_exists
    }

    /// Terminal state: JSON present, legacy XML gone.
    pub fn is_resolved(&self) -> bool {
        self.json_exists && !self.xml_exists
    }
}

/// Granule records keyed by base name.
///
/// Backed by a `BTreeMap` so two maps built from the same observations compare equal and
/// iterate in the same order regardless of the order observations arrived in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GranuleMap {
    records: BTreeMap<String, GranuleRecord>,
}

impl GranuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one classified listing entry.
    pub fn observe(&mut self, key: &ClassifiedKey, size: u64) {
        self.merge_record(GranuleRecord::from_observation(key, size));
    }

    /// Merge a record, creating the entry on first sight.
    pub fn merge_record(&mut self, record: GranuleRecord) {
        match self.records.get_mut(&record.base_name) {
            Some(existing) => existing.merge(&record),
            None => {
                self.records.insert(record.base_name.clone(), record);
            }
        }
    }

    /// Merge every record of another map into this one.
    pub fn merge_map(&mut self, other: GranuleMap) {
        for record in other.records.into_values() {
            self.merge_record(record);
        }
    }

    pub fn get(&self, base_name: &str) -> Option<&GranuleRecord> {
        self.records.get(base_name)
    }

    pub fn get_mut(&mut self, base_name: &str) -> Option<&mut GranuleRecord> {
        self.records.get_mut(base_name)
    }

    pub fn contains(&self, base_name: &str) -> bool {
        self.records.contains_key(base_name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &GranuleRecord> {
        self.records.values()
    }

    /// Base names of granules without a JSON companion, in name order.
    pub fn missing_json(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.needs_json())
            .map(|r| r.base_name.clone())
            .collect()
    }

    /// Clone the records for the given names, skipping unknown names.
    pub fn records_for<S: AsRef<str>>(&self, names: &[S]) -> Vec<GranuleRecord> {
        names
            .iter()
            .filter_map(|name| self.records.get(name.as_ref()).cloned())
            .collect()
    }

    /// Clone every record, in name order.
    pub fn to_records(&self) -> Vec<GranuleRecord> {
        self.records.values().cloned().collect()
    }

    pub fn into_records(self) -> Vec<GranuleRecord> {
        self.records.into_values().collect()
    }
}

impl FromIterator<GranuleRecord> for GranuleMap {
    fn from_iter<I: IntoIterator<Item = GranuleRecord>>(iter: I) -> Self {
        let mut map = Self::new();
        for record in iter {
            map.merge_record(record);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::classify_key;

    fn observe_all(map: &mut GranuleMap, entries: &[(&str, u64)]) {
        for (key, size) in entries {
            let classified = classify_key(key).unwrap();
            map.observe(&classified, *size);
        }
    }

    #[test]
    fn json_then_xml_keeps_both_flags() {
        let mut map = GranuleMap::new();
        observe_all(&mut map, &[("c/G1.cmr.json", 800), ("c/G1.cmr.xml", 500)]);

        let record = map.get("G1").unwrap();
        assert!(record.xml_exists);
        assert!(record.json_exists);
        assert_eq!(record.json_file_size, 800);
    }

    #[test]
    fn merge_never_downgrades_flags() {
        let mut record = GranuleRecord::new("G1");
        record.merge(&GranuleRecord {
            base_name: "G1".to_string(),
            xml_exists: true,
            json_exists: true,
            json_file_size: 10,
        });
        record.merge(&GranuleRecord::new("G1"));

        assert!(record.xml_exists);
        assert!(record.json_exists);
        assert_eq!(record.json_file_size, 10);
    }

    #[test]
    fn nonzero_size_replaces_and_zero_does_not() {
        let mut record = GranuleRecord::new("G1");
        record.merge(&GranuleRecord {
            json_file_size: 100,
            json_exists: true,
            ..GranuleRecord::new("G1")
        });
        record.merge(&GranuleRecord {
            json_file_size: 250,
            ..GranuleRecord::new("G1")
        });
        assert_eq!(record.json_file_size, 250);

        record.merge(&GranuleRecord::new("G1"));
        assert_eq!(record.json_file_size, 250);
    }

    #[test]
    fn page_order_does_not_change_result() {
        let pages: Vec<Vec<(&str, u64)>> = vec![
            vec![("c/A.cmr.xml", 500), ("c/B.cmr.json", 800)],
            vec![("c/B.cmr.xml", 400), ("c/C.cmr.json", 20)],
            vec![("c/A.cmr.json", 0), ("c/C.cmr.xml", 30)],
        ];

        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut results = Vec::new();
        for order in orders {
            let mut map = GranuleMap::new();
            for idx in order {
                observe_all(&mut map, &pages[idx]);
            }
            results.push(map);
        }

        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let mut once = GranuleMap::new();
        observe_all(&mut once, &[("c/A.cmr.xml", 1), ("c/A.cmr.json", 9)]);

        let mut twice = once.clone();
        twice.merge_map(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn missing_json_lists_only_unresolved() {
        let mut map = GranuleMap::new();
        observe_all(
            &mut map,
            &[("c/A.cmr.xml", 1), ("c/B.cmr.json", 2), ("c/C.cmr.xml", 3)],
        );
        assert_eq!(map.missing_json(), vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn lifecycle_reaches_terminal_state() {
        let mut record = GranuleRecord::new("A");
        record.xml_exists = true;
        assert!(record.needs_json());
        assert!(!record.is_resolved());

        record.mark_json_written(1234);
        record.mark_legacy_removed();
        assert!(record.is_resolved());
        assert_eq!(record.json_file_size, 1234);
    }
}
