//! Relational store
//!
//! A single SQLite database file holding the four tables and the reporting
//! views. The file is recreated by every load and opened read-only by the
//! reporting stages. The pool is capped at one connection; stages await
//! their queries strictly in sequence.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::analytics::{module_comparison, ModuleStats};
use crate::checklist::{failure_counts, rank_reasons, ReasonCount};
use crate::dataset::Dataset;
use crate::error::StoreError;

pub mod loader;
pub mod schema;

pub use loader::{load_dataset, LoadSummary};

/// Number of top failure reasons reported by [`CertStore::verify`]
const VERIFY_TOP_REASONS: usize = 3;

/// Connection to the certification database
#[derive(Debug, Clone)]
pub struct CertStore {
    pool: SqlitePool,
}

impl CertStore {
    /// Recreate the database file at `path` with empty tables
    pub async fn create(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::File {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        if path.exists() {
            std::fs::remove_file(path).map_err(|source| StoreError::File {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true);
        let store = Self::connect(options).await?;
        schema::create_tables(&store.pool).await?;
        info!(path = %path.display(), "Created database");
        Ok(store)
    }

    /// Open an existing database for reporting
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::MissingDatabase(path.to_path_buf()));
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .foreign_keys(true);
        Self::connect(options).await
    }

    /// Private in-memory database with empty tables
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Connect)?
            .foreign_keys(true);
        let store = Self::connect(options).await?;
        schema::create_tables(&store.pool).await?;
        Ok(store)
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // One long-lived connection: an in-memory database lives only as
        // long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Load the dataset, then create the views over it
    pub async fn materialize(&self, dataset: &Dataset) -> Result<LoadSummary, StoreError> {
        let summary = load_dataset(&self.pool, dataset).await?;
        schema::create_views(&self.pool).await?;
        Ok(summary)
    }

    pub async fn row_counts(&self) -> Result<Vec<(&'static str, i64)>, StoreError> {
        let mut counts = Vec::with_capacity(schema::TABLES.len());
        for &(table, _) in schema::TABLES {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let (count,): (i64,) = sqlx::query_as(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|source| StoreError::Query {
                    query: "row counts",
                    source,
                })?;
            counts.push((table, count));
        }
        Ok(counts)
    }

    /// Post-load sanity summary
    pub async fn verify(&self) -> Result<Verification, StoreError> {
        let row_counts = self.row_counts().await?;
        let modules = module_comparison(&self.pool).await?;
        let mut top_failures = rank_reasons(failure_counts(&self.pool, None).await?);
        top_failures.truncate(VERIFY_TOP_REASONS);

        for module in &modules {
            info!(
                module = %module.mid_module,
                applications = module.applications,
                success_rate = module.success_rate,
                avg_days = module.avg_days,
                "Module verification"
            );
        }
        info!(
            top_failures = ?top_failures.iter().map(|r| r.reason.as_str()).collect::<Vec<_>>(),
            "Top failure reasons"
        );

        Ok(Verification {
            row_counts,
            modules,
            top_failures,
        })
    }
}

/// Result of [`CertStore::verify`]
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub row_counts: Vec<(&'static str, i64)>,
    pub modules: Vec<ModuleStats>,
    pub top_failures: Vec<ReasonCount>,
}
