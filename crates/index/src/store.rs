//! Granule index trait and SQLite implementation.

use crate::chunking::{SQLITE_VAR_LIMIT, chunks_for, row_placeholders};
use crate::error::{IndexError, IndexResult};
use crate::models::GranuleRow;
use async_trait::async_trait;
use granary_core::{DedupPolicy, GranuleRecord};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fields compared per granule by `select_matching`.
const MATCH_FIELDS: usize = 3;
/// Fields bound per granule by a bulk insert.
const INSERT_FIELDS: usize = 4;

/// Row counts produced by one insert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows written (inserted or replaced).
    pub written: u64,
    /// Incoming records left untouched because an identical row was already indexed.
    pub skipped: u64,
}

/// Persisted deduplication index of granule state.
#[async_trait]
pub trait GranuleIndex: Send + Sync {
    /// Names of incoming records whose `(base_name, xml_exists, json_exists)` exactly
    /// match a stored row.
    async fn select_matching(&self, records: &[GranuleRecord]) -> IndexResult<HashSet<String>>;

    /// Insert every record not returned by [`GranuleIndex::select_matching`].
    async fn insert_skip_existing(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome>;

    /// Upsert every record, fully replacing existing rows.
    async fn insert_replace(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome>;

    /// Insert every record, failing with [`IndexError::DuplicateRecord`] and writing
    /// nothing if any name is already indexed.
    async fn insert_or_error(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome>;

    /// Delete rows by name, returning the number actually removed.
    async fn delete_by_names(&self, names: &[String]) -> IndexResult<u64>;

    /// Fetch one record.
    async fn get(&self, base_name: &str) -> IndexResult<Option<GranuleRecord>>;

    /// Fetch every record ordered by name.
    async fn all(&self) -> IndexResult<Vec<GranuleRecord>>;

    /// Number of indexed granules.
    async fn count(&self) -> IndexResult<u64>;

    /// Check database connectivity.
    async fn health_check(&self) -> IndexResult<()>;

    /// Insert under the given dedup policy.
    async fn insert(
        &self,
        policy: DedupPolicy,
        records: &[GranuleRecord],
    ) -> IndexResult<InsertOutcome> {
        match policy {
            DedupPolicy::Skip => self.insert_skip_existing(records).await,
            DedupPolicy::Replace => self.insert_replace(records).await,
            DedupPolicy::Error => self.insert_or_error(records).await,
        }
    }
}

/// SQLite-backed granule index.
pub struct SqliteIndex {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open (creating if needed) the index file at `path`.
    ///
    /// Any failure to create, open, lock, or bootstrap the file is reported as
    /// [`IndexError::Unavailable`].
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> IndexResult<Self> {
        let path = path.as_ref();
        let unavailable = |message: String| IndexError::Unavailable {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("cache_size", "-64000")
            // Competing writers wait on the file lock instead of failing immediately.
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // Single writer per process; SQLite serializes the rest through its file lock.
            .max_connections(1)
            .acquire_timeout(busy_timeout)
            .connect_with(opts)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let index = Self {
            pool,
            path: path.to_path_buf(),
        };
        index
            .migrate()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        tracing::debug!(path = %index.path.display(), "Opened granule index");
        Ok(index)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> IndexResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Bulk upsert inside one transaction, one statement per chunk.
    async fn write_rows(&self, records: &[GranuleRecord]) -> IndexResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for batch in chunks_for(records, INSERT_FIELDS) {
            let query = format!(
                "INSERT OR REPLACE INTO granules (base_name, xml_exists, json_exists, json_file_size) VALUES {}",
                row_placeholders(batch.len(), INSERT_FIELDS)
            );
            let mut query_builder = sqlx::query(&query);
            for record in batch {
                let row = GranuleRow::from(record);
                query_builder = query_builder
                    .bind(row.base_name)
                    .bind(row.xml_exists)
                    .bind(row.json_exists)
                    .bind(row.json_file_size);
            }
            written += query_builder.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(written)
    }
}

#[async_trait]
impl GranuleIndex for SqliteIndex {
    async fn select_matching(&self, records: &[GranuleRecord]) -> IndexResult<HashSet<String>> {
        let mut matched = HashSet::new();
        if records.is_empty() {
            return Ok(matched);
        }

        for batch in chunks_for(records, MATCH_FIELDS) {
            let query = format!(
                "SELECT base_name FROM granules WHERE (base_name, xml_exists, json_exists) IN (VALUES {})",
                row_placeholders(batch.len(), MATCH_FIELDS)
            );
            let mut query_builder = sqlx::query_scalar::<_, String>(&query);
            for record in batch {
                query_builder = query_builder
                    .bind(&record.base_name)
                    .bind(record.xml_exists)
                    .bind(record.json_exists);
            }
            matched.extend(query_builder.fetch_all(&self.pool).await?);
        }

        Ok(matched)
    }

    async fn insert_skip_existing(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome> {
        let matched = self.select_matching(records).await?;
        let pending: Vec<GranuleRecord> = records
            .iter()
            .filter(|record| !matched.contains(&record.base_name))
            .cloned()
            .collect();

        self.write_rows(&pending).await?;
        tracing::debug!(
            written = pending.len(),
            skipped = records.len() - pending.len(),
            "Indexed granules (skip existing)"
        );

        Ok(InsertOutcome {
            written: pending.len() as u64,
            skipped: (records.len() - pending.len()) as u64,
        })
    }

    async fn insert_replace(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome> {
        self.write_rows(records).await?;
        Ok(InsertOutcome {
            written: records.len() as u64,
            skipped: 0,
        })
    }

    async fn insert_or_error(&self, records: &[GranuleRecord]) -> IndexResult<InsertOutcome> {
        if records.is_empty() {
            return Ok(InsertOutcome::default());
        }

        // Take the write lock up front. A deferred transaction would read a snapshot
        // first and fail with SQLITE_BUSY_SNAPSHOT if another process commits before the
        // upgrade, bypassing the busy timeout.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let mut existing = Vec::new();
        for batch in records.chunks(SQLITE_VAR_LIMIT) {
            let query = format!(
                "SELECT base_name FROM granules WHERE base_name IN ({})",
                vec!["?"; batch.len()].join(", ")
            );
            let mut query_builder = sqlx::query_scalar::<_, String>(&query);
            for record in batch {
                query_builder = query_builder.bind(&record.base_name);
            }
            existing.extend(query_builder.fetch_all(&mut *tx).await?);
        }

        if !existing.is_empty() {
            tx.rollback().await?;
            existing.sort();
            return Err(IndexError::DuplicateRecord { names: existing });
        }

        for batch in chunks_for(records, INSERT_FIELDS) {
            let query = format!(
                "INSERT INTO granules (base_name, xml_exists, json_exists, json_file_size) VALUES {}",
                row_placeholders(batch.len(), INSERT_FIELDS)
            );
            let mut query_builder = sqlx::query(&query);
            for record in batch {
                let row = GranuleRow::from(record);
                query_builder = query_builder
                    .bind(row.base_name)
                    .bind(row.xml_exists)
                    .bind(row.json_exists)
                    .bind(row.json_file_size);
            }
            query_builder.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(InsertOutcome {
            written: records.len() as u64,
            skipped: 0,
        })
    }

    async fn delete_by_names(&self, names: &[String]) -> IndexResult<u64> {
        if names.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for batch in chunks_for(names, 1) {
            let query = format!(
                "DELETE FROM granules WHERE base_name IN ({})",
                vec!["?"; batch.len()].join(", ")
            );
            let mut query_builder = sqlx::query(&query);
            for name in batch {
                query_builder = query_builder.bind(name);
            }
            removed += query_builder.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        tracing::info!(requested = names.len(), removed, "Deleted granules from index");
        Ok(removed)
    }

    async fn get(&self, base_name: &str) -> IndexResult<Option<GranuleRecord>> {
        let row = sqlx::query_as::<_, GranuleRow>(
            "SELECT base_name, xml_exists, json_exists, json_file_size FROM granules WHERE base_name = ?",
        )
        .bind(base_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(GranuleRecord::from))
    }

    async fn all(&self) -> IndexResult<Vec<GranuleRecord>> {
        let rows = sqlx::query_as::<_, GranuleRow>(
            "SELECT base_name, xml_exists, json_exists, json_file_size FROM granules ORDER BY base_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GranuleRecord::from).collect())
    }

    async fn count(&self) -> IndexResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM granules")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> IndexResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS granules (
    base_name TEXT PRIMARY KEY,
    xml_exists INTEGER NOT NULL,
    json_exists INTEGER NOT NULL,
    json_file_size INTEGER NOT NULL DEFAULT 0
);
"#;
