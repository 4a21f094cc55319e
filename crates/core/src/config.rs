//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Largest page the object listing API will return.
pub const MAX_LISTING_PAGE_SIZE: usize = 1000;

/// Lower bound for the index busy timeout; concurrent batches may hold the write lock
/// for a long time.
pub const MIN_BUSY_TIMEOUT_SECS: u64 = 60;

/// The collection being reconciled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection short name (e.g. "ATL03").
    #[serde(default)]
    pub short_name: String,
    /// Collection version (e.g. "006").
    #[serde(default)]
    pub version: String,
    /// Optional sub-prefix below `<short_name>__<version>/`.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl CollectionConfig {
    /// Key prefix holding the collection's objects, always ending in `/`.
    ///
    /// `<short_name>__<version>/` followed by `<prefix>/` when a sub-prefix is set.
    pub fn path(&self) -> String {
        let mut path = format!("{}__{}/", self.short_name, self.version);
        if let Some(prefix) = self.prefix.as_deref() {
            let prefix = prefix.trim_matches('/');
            if !prefix.is_empty() {
                path.push_str(prefix);
                path.push('/');
            }
        }
        path
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.short_name.trim().is_empty() {
            return Err("collection.short_name is required".to_string());
        }
        if self.version.trim().is_empty() {
            return Err("collection.version is required".to_string());
        }
        if self.short_name.contains('/') || self.version.contains('/') {
            return Err("collection.short_name and collection.version must not contain '/'"
                .to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage rooted at a directory.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket holding the collection.
        #[serde(default)]
        bucket: String,
        /// Optional endpoint URL (for MinIO, LocalStack, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Named AWS profile for the default credentials chain.
        profile: Option<String>,
        /// AWS access key ID. Falls back to the default credentials chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the default credentials chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::S3 {
            bucket: String::new(),
            endpoint: None,
            region: None,
            profile: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("storage.bucket is required".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("storage.path is required for filesystem storage".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Persisted deduplication index configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database file.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// How long a writer waits for a competing writer's lock.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./granary.db")
}

fn default_busy_timeout_secs() -> u64 {
    MIN_BUSY_TIMEOUT_SECS
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl IndexConfig {
    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.busy_timeout_secs < MIN_BUSY_TIMEOUT_SECS {
            return Err(format!(
                "index.busy_timeout_secs must be at least {MIN_BUSY_TIMEOUT_SECS}, got {}",
                self.busy_timeout_secs
            ));
        }
        Ok(())
    }
}

/// CMR deployment the metadata is fetched from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sbx,
    Sit,
    Uat,
    #[default]
    Prod,
}

impl Environment {
    /// Search host for this environment. Non-production environments share UAT.
    pub fn cmr_base_url(self) -> &'static str {
        match self {
            Self::Sbx | Self::Sit | Self::Uat => "https://cmr.uat.earthdata.nasa.gov",
            Self::Prod => "https://cmr.earthdata.nasa.gov",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sbx => "sbx",
            Self::Sit => "sit",
            Self::Uat => "uat",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sbx" => Ok(Self::Sbx),
            "sit" => Ok(Self::Sit),
            "uat" => Ok(Self::Uat),
            "prod" => Ok(Self::Prod),
            other => Err(crate::Error::Config(format!(
                "unknown environment '{other}' (expected sbx, sit, uat or prod)"
            ))),
        }
    }
}

/// CMR search client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CmrConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's search host.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CmrConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CmrConfig {
    /// Search host to query, honouring `base_url`.
    pub fn search_base_url(&self) -> String {
        match self.base_url.as_deref() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self.environment.cmr_base_url().to_string(),
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("cmr.request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// How newly discovered records interact with previously persisted ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Leave unchanged known granules alone, insert new or changed ones.
    #[default]
    Skip,
    /// Overwrite any existing row.
    Replace,
    /// Fail the whole insert if any granule is already known.
    Error,
}

impl DedupPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "replace" => Ok(Self::Replace),
            "error" => Ok(Self::Error),
            other => Err(crate::Error::Config(format!(
                "unknown dedup policy '{other}' (expected skip, replace or error)"
            ))),
        }
    }
}

/// Which legacy objects cleanup may delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Only legacy objects whose granule has JSON metadata.
    #[default]
    Superseded,
    /// Every discovered legacy object, regardless of JSON state.
    Aggressive,
}

/// Reconciliation pass tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Keys requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Granules backfilled per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent lookups, and separately concurrent uploads.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
    #[serde(default)]
    pub cleanup: CleanupMode,
}

fn default_page_size() -> usize {
    MAX_LISTING_PAGE_SIZE
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_concurrency() -> usize {
    16
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            dedup_policy: DedupPolicy::default(),
            cleanup: CleanupMode::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 || self.page_size > MAX_LISTING_PAGE_SIZE {
            return Err(format!(
                "reconcile.page_size must be between 1 and {MAX_LISTING_PAGE_SIZE}, got {}",
                self.page_size
            ));
        }
        if self.batch_size == 0 {
            return Err("reconcile.batch_size must be greater than zero".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("reconcile.max_concurrency must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Report output configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// CSV file receiving backfilled entries. Defaults to `<short_name>__<version>.csv`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cmr: CmrConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<(), String> {
        let errors: Vec<String> = [
            self.collection.validate(),
            self.storage.validate(),
            self.index.validate(),
            self.cmr.validate(),
            self.reconcile.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// Where the CSV report is written.
    pub fn report_path(&self) -> PathBuf {
        self.report.path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}__{}.csv",
                self.collection.short_name, self.collection.version
            ))
        })
    }
}
