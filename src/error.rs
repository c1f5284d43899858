//! Error handling for the certification pipeline
//!
//! One `thiserror` enum per stage, wrapped by [`PipelineError`]. Validation
//! findings are not errors; they are reported as data by the validator.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[cfg(feature = "database")]
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checklist error: {0}")]
    Checklist(#[from] ChecklistError),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Malformed weighted distribution tables
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Distribution '{table}' has no entries")]
    Empty { table: &'static str },

    #[error("Distribution '{table}' has invalid weight {weight}")]
    InvalidWeight { table: &'static str, weight: f64 },

    #[error("Distribution '{table}' weights sum to {sum}, expected 1")]
    NotNormalized { table: &'static str, sum: f64 },

    #[error("Distribution '{table}' rejected by sampler: {source}")]
    Weights {
        table: &'static str,
        source: rand::distributions::WeightedError,
    },
}

/// Generation settings that cannot produce a consistent dataset
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("{applications} applications requested but no clients to assign them to")]
    NoClients { applications: u32 },

    #[error("Too many {entity}: requested {requested}, ID format allows at most {max}")]
    TooMany {
        entity: &'static str,
        requested: u32,
        max: u32,
    },

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Pending probability {0} is outside [0, 1]")]
    InvalidProbability(f64),

    #[error("Pending window of {days} days is longer than the {span_days}-day submission range")]
    PendingWindowTooLong { days: u32, span_days: i64 },

    #[error("{date} shifted by {days} days is outside the supported date range")]
    DateOutOfRange {
        date: chrono::NaiveDate,
        days: i64,
    },
}

/// CSV dataset read/write errors
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Failed to flush {path}: {source}")]
    Flush {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Structural problems that stop the validator from reading its input
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Cannot read {path}: {source}")]
    Read { path: PathBuf, source: csv::Error },

    #[error("{path} is missing required column '{column}'")]
    MissingColumn {
        path: PathBuf,
        column: &'static str,
    },
}

/// Relational store errors. All of them are fatal.
#[cfg(feature = "database")]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database file not found: {0}")]
    MissingDatabase(PathBuf),

    #[error("Failed to prepare database file {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Schema statement failed ({object}): {source}")]
    Schema {
        object: &'static str,
        source: sqlx::Error,
    },

    #[error("Load into {table} rejected row {key}: {source}")]
    Load {
        table: &'static str,
        key: String,
        source: sqlx::Error,
    },

    #[error("Transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("Query '{query}' failed: {source}")]
    Query {
        query: &'static str,
        source: sqlx::Error,
    },
}

/// Checklist export errors
#[derive(Error, Debug)]
pub enum ChecklistError {
    #[error("Failed to write checklist export {path}: {source}")]
    Export { path: PathBuf, source: csv::Error },

    #[error("Failed to flush checklist export {path}: {source}")]
    Flush {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(feature = "database")]
impl StoreError {
    /// True when the underlying SQLite error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Load { source, .. } => source
                .as_database_error()
                .map(|e| !matches!(e.kind(), sqlx::error::ErrorKind::Other))
                .unwrap_or(false),
            _ => false,
        }
    }
}
