//! Layered configuration: TOML file, then `GRANARY_` environment, then flags.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use granary_core::config::{AppConfig, StorageConfig};
use granary_core::{CleanupMode, DedupPolicy, Environment};
use std::path::{Path, PathBuf};

/// Environment variable prefix; `__` separates nested keys (`GRANARY_INDEX__PATH`).
pub const ENV_PREFIX: &str = "GRANARY_";

/// Load configuration from an optional TOML file and the environment.
///
/// An explicitly named file that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        tracing::info!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Values given on the command line. `None` leaves the loaded value in place.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub short_name: Option<String>,
    pub version: Option<String>,
    pub bucket: Option<String>,
    pub aws_profile: Option<String>,
    pub prefix: Option<String>,
    pub environment: Option<Environment>,
    pub index: Option<PathBuf>,
    pub policy: Option<DedupPolicy>,
    pub aggressive_cleanup: bool,
    pub max_concurrency: Option<usize>,
    pub report: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(short_name) = &self.short_name {
            config.collection.short_name = short_name.clone();
        }
        if let Some(version) = &self.version {
            config.collection.version = version.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.collection.prefix = Some(prefix.clone());
        }

        // A bucket or profile on the command line always means S3.
        if (self.bucket.is_some() || self.aws_profile.is_some())
            && matches!(config.storage, StorageConfig::Filesystem { .. })
        {
            config.storage = StorageConfig::default();
        }
        if let StorageConfig::S3 {
            bucket, profile, ..
        } = &mut config.storage
        {
            if let Some(value) = &self.bucket {
                *bucket = value.clone();
            }
            if let Some(value) = &self.aws_profile {
                *profile = Some(value.clone());
            }
        }

        if let Some(environment) = self.environment {
            config.cmr.environment = environment;
        }
        if let Some(index) = &self.index {
            config.index.path = index.clone();
        }
        if let Some(policy) = self.policy {
            config.reconcile.dedup_policy = policy;
        }
        if self.aggressive_cleanup {
            config.reconcile.cleanup = CleanupMode::Aggressive;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.reconcile.max_concurrency = max_concurrency;
        }
        if let Some(report) = &self.report {
            config.report.path = Some(report.clone());
        }
    }
}
