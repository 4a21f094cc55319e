//! Object key classification.
//!
//! A metadata object key ends in `<granule base name><suffix>` where the suffix is one of
//! the [`MetadataSuffix`] variants. Only the final path segment is considered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of metadata companion object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSuffix {
    /// Deprecated ECHO10/ISO XML companion (`.cmr.xml`).
    LegacyXml,
    /// UMM-G JSON companion (`.cmr.json`).
    Json,
}

impl MetadataSuffix {
    /// All recognised suffixes.
    pub const ALL: [MetadataSuffix; 2] = [MetadataSuffix::LegacyXml, MetadataSuffix::Json];

    /// The literal key suffix, including the leading dot.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LegacyXml => ".cmr.xml",
            Self::Json => ".cmr.json",
        }
    }

    /// Build the object name for a granule with this suffix.
    pub fn object_name(self, base_name: &str) -> String {
        format!("{base_name}{}", self.as_str())
    }
}

impl fmt::Display for MetadataSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key that matched `<base_name><suffix>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedKey {
    /// Granule base name (final path segment with the suffix stripped).
    pub base_name: String,
    /// Which metadata object this key is.
    pub suffix: MetadataSuffix,
}

/// Return the final `/`-separated segment of an object key.
pub fn final_segment(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Classify an object key as legacy XML or JSON metadata for a granule.
///
/// Keys whose final segment does not end in a known suffix, or whose base name would be
/// empty, yield [`crate::Error::MalformedKey`].
pub fn classify_key(key: &str) -> crate::Result<ClassifiedKey> {
    let segment = final_segment(key);

    for suffix in MetadataSuffix::ALL {
        if let Some(base_name) = segment.strip_suffix(suffix.as_str()) {
            if base_name.is_empty() {
                return Err(crate::Error::MalformedKey(format!(
                    "{key}: empty granule name"
                )));
            }
            return Ok(ClassifiedKey {
                base_name: base_name.to_string(),
                suffix,
            });
        }
    }

    Err(crate::Error::MalformedKey(key.to_string()))
}
