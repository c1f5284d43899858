//! MID certification history pipeline
//!
//! Builds a synthetic history of Measuring Instruments Directive
//! certification applications (Module B type examination and Module D
//! quality assurance), checks it for data-quality problems, loads it into
//! SQLite and derives KPI reports and a prioritised pre-audit checklist.
//!
//! ## Stages
//!
//! ```text
//! generate -> validate -> load -> report
//!                              \-> checklist
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mid_cert::config::GenerationConfig;
//! use mid_cert::validate::Validator;
//! use mid_cert::validate::RawDataset;
//!
//! let dataset = mid_cert::synth::generate_dataset(&GenerationConfig::default()).unwrap();
//! let raw = RawDataset::from(&dataset);
//! let report = Validator::new(&raw).run_all();
//! println!("{report}");
//! ```

// Core error handling
pub mod error;

// Configuration and synthesis
pub mod config;
pub mod sampler;
pub mod synth;

// CSV dataset and data-quality checks
pub mod dataset;
pub mod validate;

// Relational store and reporting (when enabled)
#[cfg(feature = "database")]
pub mod analytics;
#[cfg(feature = "database")]
pub mod store;

pub mod checklist;
pub mod pipeline;
pub mod report;

pub use cert_types::{
    Application, AuditEvent, AuditStatus, CertificationResult, Client, FailureReason,
    InstrumentType, ManufacturerSize, MidModule, RiskClass, Sector,
};
pub use config::{GenerationConfig, PathsConfig, PipelineConfig};
pub use dataset::{Dataset, DatasetStats};
pub use error::PipelineError;
pub use synth::{generate_dataset, Synthesizer};
pub use validate::{ValidationReport, Validator, Verdict};

#[cfg(feature = "database")]
pub use store::CertStore;
