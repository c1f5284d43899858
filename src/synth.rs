//! Record synthesizer
//!
//! Produces the four linked record streams (clients, applications,
//! certification results, audit events) in dependency order. Derived fields
//! are computed so that, for every application:
//!
//! - there is exactly one certification result,
//! - `passed_first_time` implies zero revisions,
//! - there are `1 + total_revisions` audit events in date order,
//! - every audit but the last is a FAIL with a module-specific reason,
//! - the last audit is PASS when certified and PENDING otherwise.
//!
//! The validator re-derives these rules on its own; nothing here is shared
//! with it.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use cert_types::{
    application_id, audit_id, client_id, Application, AuditEvent, AuditStatus,
    CertificationResult, Client, FailureReason, InstrumentType, ManufacturerSize, MidModule,
    RiskClass, Sector, MAX_APPLICATION_NUMBER, MAX_AUDIT_NUMBER, MAX_CLIENT_NUMBER,
};

use crate::config::GenerationConfig;
use crate::dataset::Dataset;
use crate::error::{DistributionError, GenerationError};
use crate::sampler::{chance, random_date, Categorical};

// ============================================================================
// FIXED DISTRIBUTIONS
// ============================================================================

/// SMEs dominate the client base
const MANUFACTURER_SIZE_WEIGHTS: &[(ManufacturerSize, f64)] =
    &[(ManufacturerSize::Sme, 0.65), (ManufacturerSize::Large, 0.35)];

const SECTOR_WEIGHTS: &[(Sector, f64)] = &[
    (Sector::Energy, 0.40),
    (Sector::Utilities, 0.30),
    (Sector::RetailFuel, 0.15),
    (Sector::Transportation, 0.10),
    (Sector::MultiSector, 0.05),
];

/// Unconditioned instrument mix; meters are the core business
const INSTRUMENT_WEIGHTS: &[(InstrumentType, f64)] = &[
    (InstrumentType::GasMeter, 0.35),
    (InstrumentType::ElectricityMeter, 0.30),
    (InstrumentType::WaterMeter, 0.20),
    (InstrumentType::Dispenser, 0.10),
    (InstrumentType::Taximeter, 0.05),
];

const MODULE_WEIGHTS: &[(MidModule, f64)] = &[(MidModule::B, 0.70), (MidModule::D, 0.30)];

const RISK_CLASS_WEIGHTS: &[(RiskClass, f64)] = &[
    (RiskClass::Low, 0.30),
    (RiskClass::Medium, 0.50),
    (RiskClass::High, 0.20),
];

/// Revision rounds needed after a failed first audit
const REVISION_WEIGHTS: &[(u32, f64)] = &[(1, 0.45), (2, 0.30), (3, 0.15), (4, 0.10)];

/// Upper bound of [`REVISION_WEIGHTS`]; sizes the audit ID budget
const MAX_DRAWN_REVISIONS: u32 = 4;

/// Module B findings: technical file and documentation
const MODULE_B_REASON_WEIGHTS: &[(FailureReason, f64)] = &[
    (FailureReason::TechnicalFileIncomplete, 0.25),
    (FailureReason::DocumentationInconsistencies, 0.20),
    (FailureReason::TestReportGaps, 0.15),
    (FailureReason::MetrologicalRequirementsUnclear, 0.12),
    (FailureReason::SoftwareDocumentationMissing, 0.10),
    (FailureReason::DurabilityEvidenceInsufficient, 0.08),
    (FailureReason::MarkingLabellingNonCompliant, 0.05),
    (FailureReason::EmcTestResultsMissing, 0.05),
];

/// Module D findings: QMS and production process
const MODULE_D_REASON_WEIGHTS: &[(FailureReason, f64)] = &[
    (FailureReason::TrainingRecordsMissing, 0.22),
    (FailureReason::InternalAuditGaps, 0.20),
    (FailureReason::CalibrationRecordsOutdated, 0.15),
    (FailureReason::NonConformanceHandlingUnclear, 0.12),
    (FailureReason::ProductionProcessNotDocumented, 0.10),
    (FailureReason::SupplierControlInsufficient, 0.08),
    (FailureReason::ManagementReviewIncomplete, 0.08),
    (FailureReason::CorrectiveActionRecordsMissing, 0.05),
];

/// First-time pass rate by (module, manufacturer size)
const FIRST_TIME_PASS_RATES: &[((MidModule, ManufacturerSize), f64)] = &[
    ((MidModule::B, ManufacturerSize::Sme), 0.45),
    ((MidModule::B, ManufacturerSize::Large), 0.60),
    ((MidModule::D, ManufacturerSize::Sme), 0.55),
    ((MidModule::D, ManufacturerSize::Large), 0.70),
];

/// Rate used when the (module, size) pair is not in the table
pub const FALLBACK_PASS_RATE: f64 = 0.55;

/// Added turnaround per revision round
pub const DAYS_PER_REVISION: i64 = 12;

/// Turnaround jitter is uniform in `[-TURNAROUND_JITTER_DAYS, TURNAROUND_JITTER_DAYS]`
pub const TURNAROUND_JITTER_DAYS: i64 = 10;

const COMPANY_PREFIXES: &[&str] = &[
    "Euro", "Global", "Tech", "Smart", "Precision", "Advanced", "Nordic", "Central", "Premier",
    "Allied", "United", "First", "Metro", "Alpha", "Delta", "Sigma", "Nova", "Apex",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "Meters",
    "Instruments",
    "Systems",
    "Technologies",
    "Solutions",
    "Metering",
    "Devices",
    "Engineering",
    "Manufacturing",
    "Industries",
];

/// Turnaround in days for a first-time pass
pub fn base_turnaround_days(module: MidModule) -> i64 {
    match module {
        MidModule::B => 45,
        MidModule::D => 30,
    }
}

pub fn first_time_pass_rate(module: MidModule, size: Option<ManufacturerSize>) -> f64 {
    size.and_then(|size| {
        FIRST_TIME_PASS_RATES
            .iter()
            .find(|(key, _)| *key == (module, size))
            .map(|(_, rate)| *rate)
    })
    .unwrap_or(FALLBACK_PASS_RATE)
}

/// Sector-conditioned instrument bias: (probability, candidates drawn uniformly)
fn sector_instrument_bias(sector: Sector) -> Option<(f64, &'static [InstrumentType])> {
    match sector {
        Sector::Energy => Some((
            0.8,
            &[InstrumentType::GasMeter, InstrumentType::ElectricityMeter],
        )),
        Sector::Utilities => Some((0.7, &[InstrumentType::WaterMeter])),
        Sector::RetailFuel => Some((0.7, &[InstrumentType::Dispenser])),
        Sector::Transportation => Some((0.6, &[InstrumentType::Taximeter])),
        Sector::MultiSector => None,
    }
}

/// All weighted tables, validated once
#[derive(Debug, Clone)]
pub struct DistributionTables {
    pub manufacturer_size: Categorical<ManufacturerSize>,
    pub sector: Categorical<Sector>,
    pub instrument: Categorical<InstrumentType>,
    pub module: Categorical<MidModule>,
    pub risk_class: Categorical<RiskClass>,
    pub revisions: Categorical<u32>,
    pub module_b_reasons: Categorical<FailureReason>,
    pub module_d_reasons: Categorical<FailureReason>,
}

impl DistributionTables {
    pub fn standard() -> Result<Self, DistributionError> {
        Ok(Self {
            manufacturer_size: Categorical::new("manufacturer_size", MANUFACTURER_SIZE_WEIGHTS)?,
            sector: Categorical::new("sector", SECTOR_WEIGHTS)?,
            instrument: Categorical::new("instrument_type", INSTRUMENT_WEIGHTS)?,
            module: Categorical::new("mid_module", MODULE_WEIGHTS)?,
            risk_class: Categorical::new("risk_class", RISK_CLASS_WEIGHTS)?,
            revisions: Categorical::new("total_revisions", REVISION_WEIGHTS)?,
            module_b_reasons: Categorical::new("module_b_reasons", MODULE_B_REASON_WEIGHTS)?,
            module_d_reasons: Categorical::new("module_d_reasons", MODULE_D_REASON_WEIGHTS)?,
        })
    }

    pub fn failure_reasons(&self, module: MidModule) -> &Categorical<FailureReason> {
        match module {
            MidModule::B => &self.module_b_reasons,
            MidModule::D => &self.module_d_reasons,
        }
    }
}

// ============================================================================
// SYNTHESIZER
// ============================================================================

/// Generates a complete, internally consistent dataset
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: GenerationConfig,
    tables: DistributionTables,
    /// Submissions after this date may still be pending
    pending_cutoff: NaiveDate,
}

impl Synthesizer {
    /// Check the config and build the distribution tables
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let pending_cutoff = check_config(&config)?;
        Ok(Self {
            config,
            tables: DistributionTables::standard()?,
            pending_cutoff,
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Run all four stages with the given generator
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Dataset {
        let clients = self.generate_clients(rng);
        let applications = self.generate_applications(rng, &clients);
        let certification_results =
            self.generate_certification_results(rng, &clients, &applications);
        let audit_events = self.generate_audit_events(rng, &applications, &certification_results);

        Dataset {
            clients,
            applications,
            certification_results,
            audit_events,
        }
    }

    pub fn generate_clients<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Client> {
        let clients: Vec<Client> = (1..=self.config.num_clients)
            .map(|n| {
                let prefix = COMPANY_PREFIXES[rng.gen_range(0..COMPANY_PREFIXES.len())];
                let suffix = COMPANY_SUFFIXES[rng.gen_range(0..COMPANY_SUFFIXES.len())];
                let legal_form = if rng.gen::<f64>() > 0.5 { "Ltd" } else { "GmbH" };
                Client {
                    client_id: client_id(n),
                    company_name: format!("{prefix} {suffix} {legal_form}"),
                    manufacturer_size: self.tables.manufacturer_size.sample(rng),
                    sector: self.tables.sector.sample(rng),
                }
            })
            .collect();

        info!(count = clients.len(), "Generated clients");
        clients
    }

    /// Applications sorted by submission date; IDs keep draw order
    pub fn generate_applications<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        clients: &[Client],
    ) -> Vec<Application> {
        if clients.is_empty() {
            return Vec::new();
        }

        let mut applications: Vec<Application> = (1..=self.config.num_applications)
            .map(|n| {
                let client = &clients[rng.gen_range(0..clients.len())];
                let instrument_type = self.pick_instrument(rng, client.sector);
                Application {
                    application_id: application_id(n),
                    client_id: client.client_id.clone(),
                    submission_date: random_date(
                        rng,
                        self.config.start_date,
                        self.config.end_date,
                    ),
                    instrument_type,
                    mid_module: self.tables.module.sample(rng),
                    risk_class: self.tables.risk_class.sample(rng),
                }
            })
            .collect();

        applications.sort_by_key(|app| app.submission_date);
        info!(count = applications.len(), "Generated applications");
        applications
    }

    fn pick_instrument<R: Rng + ?Sized>(&self, rng: &mut R, sector: Sector) -> InstrumentType {
        if let Some((probability, candidates)) = sector_instrument_bias(sector) {
            if chance(rng, probability) {
                return candidates[rng.gen_range(0..candidates.len())];
            }
        }
        self.tables.instrument.sample(rng)
    }

    /// One result per application, in the same order as `applications`
    pub fn generate_certification_results<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        clients: &[Client],
        applications: &[Application],
    ) -> Vec<CertificationResult> {
        let sizes: HashMap<&str, ManufacturerSize> = clients
            .iter()
            .map(|c| (c.client_id.as_str(), c.manufacturer_size))
            .collect();
        let results: Vec<CertificationResult> = applications
            .iter()
            .map(|app| {
                let size = sizes.get(app.client_id.as_str()).copied();
                let passed = chance(rng, first_time_pass_rate(app.mid_module, size));
                let revisions = if passed {
                    0
                } else {
                    self.tables.revisions.sample(rng)
                };

                let jitter = rng.gen_range(-TURNAROUND_JITTER_DAYS..=TURNAROUND_JITTER_DAYS);
                let total_days = base_turnaround_days(app.mid_module)
                    + i64::from(revisions) * DAYS_PER_REVISION
                    + jitter;

                let is_recent = app.submission_date > self.pending_cutoff;
                let is_pending = is_recent && chance(rng, self.config.pending_probability);

                CertificationResult {
                    application_id: app.application_id.clone(),
                    passed_first_time: passed,
                    total_revisions: revisions,
                    // In range: submissions end at `end_date`, checked up front
                    // against the longest possible turnaround.
                    certification_date: (!is_pending)
                        .then(|| app.submission_date + Duration::days(total_days)),
                }
            })
            .collect();

        let passes = results.iter().filter(|r| r.passed_first_time).count();
        info!(
            count = results.len(),
            first_time_pass_pct = format!("{:.1}", percent(passes, results.len())),
            "Generated certification results"
        );
        results
    }

    /// Audit trail per application; `results[i]` must belong to `applications[i]`
    pub fn generate_audit_events<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        applications: &[Application],
        results: &[CertificationResult],
    ) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        let mut next_audit = 1u32;

        for (app, result) in applications.iter().zip(results) {
            let revisions = i64::from(result.total_revisions);
            let total_audits = 1 + revisions;

            // Pending cases are spread over their estimated completion window.
            let span = match result.certification_date {
                Some(certified) => (certified - app.submission_date).num_days(),
                None => base_turnaround_days(app.mid_module) + revisions * DAYS_PER_REVISION,
            };
            let spacing = if total_audits > 1 {
                span / total_audits
            } else {
                span
            };

            for i in 0..total_audits {
                let offset = ((i + 1) * spacing).min(span);
                let is_final = i == total_audits - 1;

                let (audit_status, failure_reason) = match (is_final, result.certification_date) {
                    (true, Some(_)) => (AuditStatus::Pass, None),
                    (true, None) => (AuditStatus::Pending, None),
                    (false, _) => (
                        AuditStatus::Fail,
                        Some(self.tables.failure_reasons(app.mid_module).sample(rng)),
                    ),
                };

                events.push(AuditEvent {
                    audit_id: audit_id(next_audit),
                    application_id: app.application_id.clone(),
                    audit_date: app.submission_date + Duration::days(offset),
                    audit_status,
                    failure_reason,
                });
                next_audit += 1;
            }
            debug!(application = %app.application_id, total_audits, span, "Audit trail generated");
        }

        let failures = events
            .iter()
            .filter(|e| e.audit_status == AuditStatus::Fail)
            .count();
        info!(count = events.len(), failures, "Generated audit events");
        events
    }
}

/// Generate the dataset for `config.seed`
pub fn generate_dataset(config: &GenerationConfig) -> Result<Dataset, GenerationError> {
    let synthesizer = Synthesizer::new(config.clone())?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    Ok(synthesizer.generate(&mut rng))
}

/// Longest turnaround a single application can draw
pub fn max_turnaround_days() -> i64 {
    let slowest = MidModule::ALL
        .iter()
        .map(|&module| base_turnaround_days(module))
        .max()
        .unwrap_or(0);
    slowest + i64::from(MAX_DRAWN_REVISIONS) * DAYS_PER_REVISION + TURNAROUND_JITTER_DAYS
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, GenerationError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or(GenerationError::DateOutOfRange { date, days })
}

/// Reject unusable settings; returns the pending cutoff date
fn check_config(config: &GenerationConfig) -> Result<NaiveDate, GenerationError> {
    if config.num_applications > 0 && config.num_clients == 0 {
        return Err(GenerationError::NoClients {
            applications: config.num_applications,
        });
    }
    if config.num_clients > MAX_CLIENT_NUMBER {
        return Err(GenerationError::TooMany {
            entity: "clients",
            requested: config.num_clients,
            max: MAX_CLIENT_NUMBER,
        });
    }
    // Every application may need up to 1 + MAX_DRAWN_REVISIONS audit IDs.
    let max_applications = MAX_APPLICATION_NUMBER.min(MAX_AUDIT_NUMBER / (1 + MAX_DRAWN_REVISIONS));
    if config.num_applications > max_applications {
        return Err(GenerationError::TooMany {
            entity: "applications",
            requested: config.num_applications,
            max: max_applications,
        });
    }
    if config.start_date > config.end_date {
        return Err(GenerationError::InvalidDateRange {
            start: config.start_date,
            end: config.end_date,
        });
    }
    if !(0.0..=1.0).contains(&config.pending_probability) {
        return Err(GenerationError::InvalidProbability(
            config.pending_probability,
        ));
    }

    let span_days = (config.end_date - config.start_date).num_days();
    if i64::from(config.pending_window_days) > span_days {
        return Err(GenerationError::PendingWindowTooLong {
            days: config.pending_window_days,
            span_days,
        });
    }
    // Every certification and audit date lies within this bound.
    shift(config.end_date, max_turnaround_days())?;
    shift(config.end_date, -i64::from(config.pending_window_days))
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> GenerationConfig {
        GenerationConfig {
            seed,
            num_clients: 10,
            num_applications: 60,
            ..GenerationConfig::default()
        }
    }

    fn audits_for<'a>(dataset: &'a Dataset, app_id: &str) -> Vec<&'a AuditEvent> {
        dataset
            .audit_events
            .iter()
            .filter(|e| e.application_id == app_id)
            .collect()
    }

    #[test]
    fn test_standard_tables_are_well_formed() {
        let tables = DistributionTables::standard().unwrap();
        assert_eq!(tables.module_b_reasons.labels().len(), 8);
        assert!(tables
            .failure_reasons(MidModule::D)
            .labels()
            .iter()
            .all(|r| r.module() == MidModule::D));
        assert!(tables
            .failure_reasons(MidModule::B)
            .labels()
            .iter()
            .all(|r| r.module() == MidModule::B));
        assert_eq!(
            tables.revisions.labels().iter().max().copied(),
            Some(MAX_DRAWN_REVISIONS)
        );
    }

    #[test]
    fn test_pass_rate_lookup_and_fallback() {
        assert_eq!(
            first_time_pass_rate(MidModule::B, Some(ManufacturerSize::Sme)),
            0.45
        );
        assert_eq!(
            first_time_pass_rate(MidModule::D, Some(ManufacturerSize::Large)),
            0.70
        );
        assert_eq!(first_time_pass_rate(MidModule::D, None), FALLBACK_PASS_RATE);
    }

    #[test]
    fn test_config_rejections() {
        let no_clients = GenerationConfig {
            num_clients: 0,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            Synthesizer::new(no_clients),
            Err(GenerationError::NoClients { .. })
        ));

        let backwards = GenerationConfig {
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            ..GenerationConfig::default()
        };
        assert!(matches!(
            Synthesizer::new(backwards),
            Err(GenerationError::InvalidDateRange { .. })
        ));

        let too_many = GenerationConfig {
            num_applications: 50_000,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            Synthesizer::new(too_many),
            Err(GenerationError::TooMany { .. })
        ));

        let bad_probability = GenerationConfig {
            pending_probability: 1.5,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            Synthesizer::new(bad_probability),
            Err(GenerationError::InvalidProbability(_))
        ));
    }

    #[test]
    fn test_pending_window_must_fit_submission_range() {
        let huge_window = GenerationConfig {
            pending_window_days: u32::MAX,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            generate_dataset(&huge_window),
            Err(GenerationError::PendingWindowTooLong { days: u32::MAX, .. })
        ));

        // A window covering the whole range makes every submission recent
        let span = GenerationConfig::default();
        let whole_range = GenerationConfig {
            pending_window_days: (span.end_date - span.start_date).num_days() as u32,
            ..GenerationConfig::default()
        };
        assert!(generate_dataset(&whole_range).is_ok());
    }

    #[test]
    fn test_dates_near_calendar_end_are_rejected() {
        let config = GenerationConfig {
            start_date: NaiveDate::MAX.pred_opt().unwrap(),
            end_date: NaiveDate::MAX,
            pending_window_days: 0,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            generate_dataset(&config),
            Err(GenerationError::DateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_dataset_is_allowed() {
        let config = GenerationConfig {
            num_clients: 0,
            num_applications: 0,
            ..GenerationConfig::default()
        };
        let dataset = generate_dataset(&config).unwrap();
        assert!(dataset.clients.is_empty());
        assert!(dataset.audit_events.is_empty());
    }

    #[test]
    fn test_applications_sorted_by_submission() {
        let dataset = generate_dataset(&small_config(5)).unwrap();
        assert!(dataset
            .applications
            .windows(2)
            .all(|w| w[0].submission_date <= w[1].submission_date));
        let config = small_config(5);
        assert!(dataset
            .applications
            .iter()
            .all(|a| a.submission_date >= config.start_date && a.submission_date <= config.end_date));
    }

    #[test]
    fn test_zero_revision_case_has_single_final_audit() {
        let dataset = generate_dataset(&small_config(11)).unwrap();
        let result = dataset
            .certification_results
            .iter()
            .find(|r| r.total_revisions == 0 && r.certification_date.is_some())
            .expect("fixture has a first-time pass");
        let audits = audits_for(&dataset, &result.application_id);
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].audit_status, AuditStatus::Pass);
        assert_eq!(Some(audits[0].audit_date), result.certification_date);
    }

    #[test]
    fn test_two_revision_case_fails_twice_then_passes() {
        let dataset = generate_dataset(&GenerationConfig::default()).unwrap();
        let result = dataset
            .certification_results
            .iter()
            .find(|r| r.total_revisions == 2 && r.certification_date.is_some())
            .expect("reference dataset has a certified two-revision case");
        let app = dataset
            .applications
            .iter()
            .find(|a| a.application_id == result.application_id)
            .unwrap();

        let audits = audits_for(&dataset, &result.application_id);
        assert_eq!(audits.len(), 3);
        for audit in &audits[..2] {
            assert_eq!(audit.audit_status, AuditStatus::Fail);
            let reason = audit.failure_reason.expect("failed audit has a reason");
            assert_eq!(reason.module(), app.mid_module);
        }
        assert_eq!(audits[2].audit_status, AuditStatus::Pass);
        assert_eq!(audits[2].failure_reason, None);
    }

    #[test]
    fn test_pending_cases_are_recent() {
        let config = GenerationConfig {
            pending_probability: 1.0,
            ..GenerationConfig::default()
        };
        let dataset = generate_dataset(&config).unwrap();
        let cutoff = config.end_date - Duration::days(i64::from(config.pending_window_days));

        let mut pending = 0;
        for (app, result) in dataset
            .applications
            .iter()
            .zip(&dataset.certification_results)
        {
            assert_eq!(app.submission_date > cutoff, result.is_pending());
            if result.is_pending() {
                pending += 1;
                let audits = audits_for(&dataset, &app.application_id);
                assert_eq!(audits.last().unwrap().audit_status, AuditStatus::Pending);
                let estimated = app.submission_date
                    + Duration::days(
                        base_turnaround_days(app.mid_module)
                            + i64::from(result.total_revisions) * DAYS_PER_REVISION,
                    );
                assert!(audits.iter().all(|a| a.audit_date <= estimated));
            }
        }
        assert!(pending > 0);
    }

    #[test]
    fn test_audit_ids_are_sequential() {
        let dataset = generate_dataset(&small_config(3)).unwrap();
        for (i, event) in dataset.audit_events.iter().enumerate() {
            assert_eq!(event.audit_id, audit_id(i as u32 + 1));
        }
    }

    #[test]
    fn test_turnaround_stays_within_jitter_band() {
        let dataset = generate_dataset(&GenerationConfig::default()).unwrap();
        for (app, result) in dataset
            .applications
            .iter()
            .zip(&dataset.certification_results)
        {
            if let Some(certified) = result.certification_date {
                let days = (certified - app.submission_date).num_days();
                let expected = base_turnaround_days(app.mid_module)
                    + i64::from(result.total_revisions) * DAYS_PER_REVISION;
                assert!((days - expected).abs() <= TURNAROUND_JITTER_DAYS);
            }
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn arb_config() -> impl Strategy<Value = GenerationConfig> {
        (any::<u64>(), 1u32..20, 0u32..120).prop_map(|(seed, num_clients, num_applications)| {
            GenerationConfig {
                seed,
                num_clients,
                num_applications,
                ..GenerationConfig::default()
            }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn generated_records_are_consistent(config in arb_config()) {
            let dataset = generate_dataset(&config).unwrap();
            prop_assert_eq!(dataset.clients.len(), config.num_clients as usize);
            prop_assert_eq!(dataset.applications.len(), config.num_applications as usize);
            prop_assert_eq!(
                dataset.certification_results.len(),
                dataset.applications.len()
            );

            let client_ids: HashSet<&str> =
                dataset.clients.iter().map(|c| c.client_id.as_str()).collect();
            let expected_audits: u32 = dataset
                .certification_results
                .iter()
                .map(|r| 1 + r.total_revisions)
                .sum();
            prop_assert_eq!(dataset.audit_events.len(), expected_audits as usize);

            for (app, result) in dataset.applications.iter().zip(&dataset.certification_results) {
                prop_assert!(client_ids.contains(app.client_id.as_str()));
                prop_assert_eq!(&app.application_id, &result.application_id);
                prop_assert!(!result.passed_first_time || result.total_revisions == 0);
                prop_assert!(result.passed_first_time || result.total_revisions >= 1);
                if let Some(certified) = result.certification_date {
                    prop_assert!(certified > app.submission_date);
                }

                let audits: Vec<&AuditEvent> = dataset
                    .audit_events
                    .iter()
                    .filter(|e| e.application_id == app.application_id)
                    .collect();
                prop_assert_eq!(audits.len() as u32, 1 + result.total_revisions);
                prop_assert!(audits.windows(2).all(|w| w[0].audit_date <= w[1].audit_date));
                prop_assert!(audits.iter().all(|a| a.audit_date >= app.submission_date));

                let (last, earlier) = audits.split_last().unwrap();
                for audit in earlier {
                    prop_assert_eq!(audit.audit_status, AuditStatus::Fail);
                    prop_assert_eq!(
                        audit.failure_reason.map(|r| r.module()),
                        Some(app.mid_module)
                    );
                }
                let expected_final = if result.is_pending() {
                    AuditStatus::Pending
                } else {
                    AuditStatus::Pass
                };
                prop_assert_eq!(last.audit_status, expected_final);
                prop_assert_eq!(last.failure_reason, None);
                if let Some(certified) = result.certification_date {
                    prop_assert!(last.audit_date <= certified);
                }
            }
        }

        #[test]
        fn same_seed_same_dataset(config in arb_config()) {
            let first = generate_dataset(&config).unwrap();
            let second = generate_dataset(&config).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
