//! The generated dataset and its CSV interchange format
//!
//! Four files, one per record type, with a header row and `YYYY-MM-DD`
//! dates. Absent certification dates and failure reasons are empty cells.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use cert_types::{Application, AuditEvent, AuditStatus, CertificationResult, Client};

use crate::error::DatasetError;

pub const CLIENTS_FILE: &str = "clients.csv";
pub const APPLICATIONS_FILE: &str = "applications.csv";
pub const CERTIFICATION_RESULTS_FILE: &str = "certification_results.csv";
pub const AUDIT_RESULTS_FILE: &str = "audit_results.csv";

/// All four record streams, in generation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub clients: Vec<Client>,
    pub applications: Vec<Application>,
    pub certification_results: Vec<CertificationResult>,
    pub audit_events: Vec<AuditEvent>,
}

/// Headline numbers for logs and the CLI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetStats {
    pub clients: usize,
    pub applications: usize,
    pub audit_events: usize,
    pub failed_audits: usize,
    pub pending: usize,
    pub first_time_pass_pct: f64,
}

impl Dataset {
    pub fn stats(&self) -> DatasetStats {
        let passes = self
            .certification_results
            .iter()
            .filter(|r| r.passed_first_time)
            .count();
        let first_time_pass_pct = if self.certification_results.is_empty() {
            0.0
        } else {
            passes as f64 * 100.0 / self.certification_results.len() as f64
        };

        DatasetStats {
            clients: self.clients.len(),
            applications: self.applications.len(),
            audit_events: self.audit_events.len(),
            failed_audits: self
                .audit_events
                .iter()
                .filter(|e| e.audit_status == AuditStatus::Fail)
                .count(),
            pending: self
                .certification_results
                .iter()
                .filter(|r| r.is_pending())
                .count(),
            first_time_pass_pct,
        }
    }

    /// Write the four CSV files into `dir`, creating it if needed
    pub fn write_csv(&self, dir: &Path) -> Result<(), DatasetError> {
        std::fs::create_dir_all(dir).map_err(|source| DatasetError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        write_records(&dir.join(CLIENTS_FILE), &self.clients)?;
        write_records(&dir.join(APPLICATIONS_FILE), &self.applications)?;
        write_records(
            &dir.join(CERTIFICATION_RESULTS_FILE),
            &self.certification_results,
        )?;
        write_records(&dir.join(AUDIT_RESULTS_FILE), &self.audit_events)?;

        info!(dir = %dir.display(), "Saved 4 CSV files");
        Ok(())
    }

    /// Read a dataset previously written by [`Dataset::write_csv`]
    ///
    /// Parsing is strict: any value outside its domain is an error. Use the
    /// validator to inspect files that may be malformed.
    pub fn read_csv(dir: &Path) -> Result<Self, DatasetError> {
        let dataset = Self {
            clients: read_records(&dir.join(CLIENTS_FILE))?,
            applications: read_records(&dir.join(APPLICATIONS_FILE))?,
            certification_results: read_records(&dir.join(CERTIFICATION_RESULTS_FILE))?,
            audit_events: read_records(&dir.join(AUDIT_RESULTS_FILE))?,
        };
        info!(
            dir = %dir.display(),
            clients = dataset.clients.len(),
            applications = dataset.applications.len(),
            audit_events = dataset.audit_events.len(),
            "Read dataset"
        );
        Ok(dataset)
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), DatasetError> {
    let csv_error = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for record in records {
        writer.serialize(record).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| DatasetError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DatasetError> {
    let csv_error = |source| DatasetError::Csv {
        path: PathBuf::from(path),
        source,
    };

    let file = File::open(path)
        .map_err(csv::Error::from)
        .map_err(csv_error)?;
    csv::Reader::from_reader(file)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::synth::generate_dataset;

    fn small() -> Dataset {
        generate_dataset(&GenerationConfig {
            num_clients: 8,
            num_applications: 40,
            ..GenerationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_written_files_have_expected_headers() {
        let dir = tempfile::tempdir().unwrap();
        small().write_csv(dir.path()).unwrap();

        let header = |file: &str| {
            let content = std::fs::read_to_string(dir.path().join(file)).unwrap();
            content.lines().next().unwrap().to_string()
        };
        assert_eq!(
            header(CLIENTS_FILE),
            "client_id,company_name,manufacturer_size,sector"
        );
        assert_eq!(
            header(APPLICATIONS_FILE),
            "application_id,client_id,submission_date,instrument_type,mid_module,risk_class"
        );
        assert_eq!(
            header(CERTIFICATION_RESULTS_FILE),
            "application_id,passed_first_time,total_revisions,certification_date"
        );
        assert_eq!(
            header(AUDIT_RESULTS_FILE),
            "audit_id,application_id,audit_date,audit_status,failure_reason"
        );
    }

    #[test]
    fn test_read_back_equals_written() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = small();
        dataset.write_csv(dir.path()).unwrap();
        assert_eq!(Dataset::read_csv(dir.path()).unwrap(), dataset);
    }

    #[test]
    fn test_pending_and_pass_cells_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = small();
        dataset.write_csv(dir.path()).unwrap();

        let audits = std::fs::read_to_string(dir.path().join(AUDIT_RESULTS_FILE)).unwrap();
        for line in audits.lines().skip(1) {
            if line.contains(",PASS,") || line.contains(",PENDING,") {
                assert!(line.ends_with(','), "unexpected reason in {line}");
            }
        }
    }

    #[test]
    fn test_missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Dataset::read_csv(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CLIENTS_FILE));
    }

    #[test]
    fn test_stats() {
        let stats = small().stats();
        assert_eq!(stats.clients, 8);
        assert_eq!(stats.applications, 40);
        assert!(stats.audit_events >= 40);
        assert!((0.0..=100.0).contains(&stats.first_time_pass_pct));
    }
}
