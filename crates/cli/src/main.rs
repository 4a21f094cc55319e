//! Command-line interface for granary.

mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use granary_core::config::IndexConfig;
use granary_core::{DedupPolicy, Environment};
use granary_engine::{CmrClient, CsvReport, Reconciler, RunSummary};
use settings::Overrides;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "granary")]
#[command(about = "Reconcile granule metadata objects: backfill JSON from CMR, remove legacy XML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass over a collection
    Reconcile(ReconcileArgs),
    /// Delete granules from the dedup index by name
    PruneIndex {
        /// Index database file
        #[arg(long)]
        index: PathBuf,
        /// Granule base names to remove
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Collection short name
    #[arg(short = 's', long)]
    short_name: Option<String>,

    /// Collection version
    #[arg(short = 'v', long = "version")]
    collection_version: Option<String>,

    /// Bucket holding the collection
    #[arg(short, long)]
    bucket: Option<String>,

    /// Named AWS profile for credentials
    #[arg(long)]
    aws_profile: Option<String>,

    /// Sub-prefix below `<short_name>__<version>/`
    #[arg(short, long)]
    prefix: Option<String>,

    /// CMR environment (sbx, sit, uat, prod)
    #[arg(short, long)]
    environment: Option<Environment>,

    /// Path to configuration file
    #[arg(short, long, env = "GRANARY_CONFIG")]
    config: Option<PathBuf>,

    /// Dedup index database file
    #[arg(long)]
    index: Option<PathBuf>,

    /// Dedup policy for discovered granules (skip, replace, error)
    #[arg(long)]
    policy: Option<DedupPolicy>,

    /// Delete every legacy object, even for granules without JSON metadata
    #[arg(long, default_value_t = false)]
    aggressive_cleanup: bool,

    /// Concurrent lookups (and, separately, uploads)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// CSV report path (default: `<short_name>__<version>.csv`)
    #[arg(long)]
    report: Option<PathBuf>,
}

impl ReconcileArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            short_name: self.short_name.clone(),
            version: self.collection_version.clone(),
            bucket: self.bucket.clone(),
            aws_profile: self.aws_profile.clone(),
            prefix: self.prefix.clone(),
            environment: self.environment,
            index: self.index.clone(),
            policy: self.policy,
            aggressive_cleanup: self.aggressive_cleanup,
            max_concurrency: self.max_concurrency,
            report: self.report.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Reconcile(args) => reconcile(args).await,
        Commands::PruneIndex { index, names } => prune_index(index, names).await,
    }
}

async fn reconcile(args: ReconcileArgs) -> Result<()> {
    let mut config = settings::load_config(args.config.as_deref())?;
    args.overrides().apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    tracing::info!(
        collection = %config.collection.path(),
        environment = %config.cmr.environment,
        policy = %config.reconcile.dedup_policy,
        "granary v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store = granary_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = store.backend_name(), "Storage backend initialized");

    let index = granary_index::from_config(&config.index)
        .await
        .context("failed to open granule index")?;

    let source = Arc::new(CmrClient::from_config(&config.cmr)?);
    let report_path = config.report_path();
    let report = Arc::new(CsvReport::new(&report_path));

    let reconciler = Reconciler::new(
        store,
        index,
        source,
        report,
        config.collection.clone(),
        config.reconcile.clone(),
    )?;
    let summary = reconciler.run().await.context("reconciliation failed")?;

    print_summary(&summary, &report_path);
    Ok(())
}

async fn prune_index(path: PathBuf, names: Vec<String>) -> Result<()> {
    let config = IndexConfig {
        path,
        ..IndexConfig::default()
    };
    let index = granary_index::from_config(&config)
        .await
        .with_context(|| format!("failed to open granule index {}", config.path.display()))?;

    let removed = index.delete_by_names(&names).await?;
    println!("Removed {removed} of {} granules from the index", names.len());
    Ok(())
}

fn print_summary(summary: &RunSummary, report_path: &std::path::Path) {
    println!("Granules discovered:   {}", summary.discovered);
    println!("Legacy XML objects:    {}", summary.legacy_keys);
    println!("Malformed keys:        {}", summary.malformed_keys);
    println!(
        "Index rows written:    {} ({} skipped)",
        summary.index_written, summary.index_skipped
    );
    println!("JSON backfilled:       {}", summary.backfilled);
    println!("No CMR hits:           {}", summary.no_hits);
    println!("Lookup failures:       {}", summary.lookup_failures);
    println!("Upload failures:       {}", summary.upload_failures);
    println!("Legacy XML deleted:    {}", summary.deleted);
    println!("Delete failures:       {}", summary.delete_failures);
    println!("Awaiting JSON:         {}", summary.not_superseded);
    if summary.backfilled > 0 {
        println!("Report:                {}", report_path.display());
    }
    if summary.is_noop() {
        println!("Nothing to do.");
    }
}
