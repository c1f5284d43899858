//! Pipeline configuration
//!
//! Defaults reproduce the reference dataset (seed 42, 50 clients, 300
//! applications over 2024-2025). A YAML file may override any subset:
//!
//! ```yaml
//! generation:
//!   seed: 7
//!   num_applications: 1000
//! paths:
//!   data_dir: out/raw
//! ```
//!
//! Environment variables `MID_CERT_DATA_DIR`, `MID_CERT_DB_PATH` and
//! `MID_CERT_CHECKLIST_PATH` override the file; CLI flags override both.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DATA_DIR_ENV: &str = "MID_CERT_DATA_DIR";
pub const DB_PATH_ENV: &str = "MID_CERT_DB_PATH";
pub const CHECKLIST_PATH_ENV: &str = "MID_CERT_CHECKLIST_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub generation: GenerationConfig,
    pub paths: PathsConfig,
}

/// Knobs for the synthetic dataset. Distribution tables are fixed and not
/// configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub seed: u64,
    pub num_clients: u32,
    pub num_applications: u32,
    /// First possible submission date (inclusive)
    pub start_date: NaiveDate,
    /// Last possible submission date (inclusive)
    pub end_date: NaiveDate,
    /// Applications submitted within this many days of `end_date` may still be pending
    pub pending_window_days: u32,
    /// Chance that a recent application is pending
    pub pending_probability: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_clients: 50,
            num_applications: 300,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or(NaiveDate::MIN),
            pending_window_days: 90,
            pending_probability: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the four generated CSV files
    pub data_dir: PathBuf,
    /// SQLite database file, recreated on every load
    pub db_path: PathBuf,
    /// Checklist export destination
    pub checklist_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/raw"),
            db_path: PathBuf::from("data/certification.db"),
            checklist_path: PathBuf::from("data/checklist_items.csv"),
        }
    }
}

impl PipelineConfig {
    /// Load config from YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply path overrides from a variable lookup (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup(DB_PATH_ENV) {
            self.paths.db_path = PathBuf::from(db);
        }
        if let Some(checklist) = lookup(CHECKLIST_PATH_ENV) {
            self.paths.checklist_path = PathBuf::from(checklist);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_dataset() {
        let config = PipelineConfig::default();
        assert_eq!(config.generation.seed, 42);
        assert_eq!(config.generation.num_clients, 50);
        assert_eq!(config.generation.num_applications, 300);
        assert_eq!(
            config.generation.end_date,
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
        assert_eq!(config.paths.data_dir, PathBuf::from("data/raw"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
generation:
  seed: 7
  start_date: 2023-06-01
paths:
  db_path: /tmp/certs.db
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.generation.seed, 7);
        assert_eq!(
            config.generation.start_date,
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
        );
        assert_eq!(config.generation.num_clients, 50);
        assert_eq!(config.paths.db_path, PathBuf::from("/tmp/certs.db"));
        assert_eq!(config.paths.data_dir, PathBuf::from("data/raw"));
    }

    #[test]
    fn test_env_overrides_paths() {
        let mut config = PipelineConfig::default();
        config.apply_env(|key| match key {
            DATA_DIR_ENV => Some("/srv/raw".to_string()),
            _ => None,
        });
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/raw"));
        assert_eq!(config.paths.db_path, PathBuf::from("data/certification.db"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "generation: [not, a, map]").unwrap();
        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }
}
