//! Remote metadata source: the CMR granule search API.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use granary_core::config::CmrConfig;
use serde::Deserialize;
use std::time::Duration;

const SEARCH_PATH: &str = "/search/granules.umm_json";

/// Result of looking up one granule.
#[derive(Clone, Debug, PartialEq)]
pub enum LookupOutcome {
    /// The source knows nothing about this granule. Not an error.
    NoHits,
    /// Canonical metadata of the first returned item.
    Found(serde_json::Value),
}

/// Source of derived metadata, keyed by collection short name and granule identifier.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn lookup(&self, short_name: &str, granule_ur: &str) -> EngineResult<LookupOutcome>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    umm: serde_json::Value,
}

/// HTTP client for CMR granule searches.
#[derive(Clone, Debug)]
pub struct CmrClient {
    http: reqwest::Client,
    search_url: String,
}

impl CmrClient {
    /// Client against `base_url` (scheme and host, no trailing path).
    pub fn new(base_url: &str, timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            search_url: format!("{}{SEARCH_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &CmrConfig) -> EngineResult<Self> {
        Self::new(&config.search_base_url(), config.request_timeout())
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

#[async_trait]
impl MetadataSource for CmrClient {
    async fn lookup(&self, short_name: &str, granule_ur: &str) -> EngineResult<LookupOutcome> {
        let response = self
            .http
            .get(&self.search_url)
            .query(&[("ShortName", short_name), ("GranuleUR", granule_ur)])
            .send()
            .await
            .map_err(|e| EngineError::lookup(granule_ur, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::lookup(granule_ur, format!("failed to read search response: {e}")))?;
        if !status.is_success() {
            return Err(EngineError::lookup(
                granule_ur,
                format!("search returned {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| EngineError::lookup(granule_ur, format!("invalid search response: {e}")))?;

        if parsed.hits == 0 {
            return Ok(LookupOutcome::NoHits);
        }
        match parsed.items.into_iter().next() {
            Some(item) => Ok(LookupOutcome::Found(item.umm)),
            None => Err(EngineError::lookup(
                granule_ur,
                format!("search reported {} hits but returned no items", parsed.hits),
            )),
        }
    }
}
