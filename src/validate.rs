//! Data-quality validation
//!
//! Twenty read-only checks over the four CSV files, grouped in five
//! categories. Findings are data: each check yields a [`CheckResult`] with
//! a severity, and the [`ValidationReport`] turns them into a verdict.
//!
//! Input is read into loosely typed rows (every cell optional text) so that
//! malformed files can still be inspected. Only unreadable files and missing
//! columns are fatal. The rules are derived here from the raw cells and do
//! not reuse anything from the generator.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use cert_types::{
    AuditStatus, InstrumentType, ManufacturerSize, MidModule, RiskClass, Sector,
};

use crate::dataset::{
    Dataset, APPLICATIONS_FILE, AUDIT_RESULTS_FILE, CERTIFICATION_RESULTS_FILE, CLIENTS_FILE,
};
use crate::error::ValidationError;

static CLIENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CLI\d{4}$").expect("valid client id pattern"));
static APPLICATION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^APP\d{5}$").expect("valid application id pattern"));
static AUDIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^AUD\d{5}$").expect("valid audit id pattern"));

/// More revisions than this is suspicious but not impossible
pub const MAX_REVISIONS: i64 = 10;
pub const MIN_TURNAROUND_DAYS: i64 = 7;
pub const MAX_TURNAROUND_DAYS: i64 = 365;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// RAW INPUT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawClient {
    pub client_id: Option<String>,
    pub company_name: Option<String>,
    pub manufacturer_size: Option<String>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawApplication {
    pub application_id: Option<String>,
    pub client_id: Option<String>,
    pub submission_date: Option<String>,
    pub instrument_type: Option<String>,
    pub mid_module: Option<String>,
    pub risk_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCertificationResult {
    pub application_id: Option<String>,
    pub passed_first_time: Option<String>,
    pub total_revisions: Option<String>,
    pub certification_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawAuditEvent {
    pub audit_id: Option<String>,
    pub application_id: Option<String>,
    pub audit_date: Option<String>,
    pub audit_status: Option<String>,
    pub failure_reason: Option<String>,
}

/// A CSV table the validator knows how to read
trait RawTable: DeserializeOwned {
    const FILE: &'static str;
    const COLUMNS: &'static [&'static str];
}

impl RawTable for RawClient {
    const FILE: &'static str = CLIENTS_FILE;
    const COLUMNS: &'static [&'static str] =
        &["client_id", "company_name", "manufacturer_size", "sector"];
}

impl RawTable for RawApplication {
    const FILE: &'static str = APPLICATIONS_FILE;
    const COLUMNS: &'static [&'static str] = &[
        "application_id",
        "client_id",
        "submission_date",
        "instrument_type",
        "mid_module",
        "risk_class",
    ];
}

impl RawTable for RawCertificationResult {
    const FILE: &'static str = CERTIFICATION_RESULTS_FILE;
    const COLUMNS: &'static [&'static str] = &[
        "application_id",
        "passed_first_time",
        "total_revisions",
        "certification_date",
    ];
}

impl RawTable for RawAuditEvent {
    const FILE: &'static str = AUDIT_RESULTS_FILE;
    const COLUMNS: &'static [&'static str] = &[
        "audit_id",
        "application_id",
        "audit_date",
        "audit_status",
        "failure_reason",
    ];
}

/// The four files as untyped rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    pub clients: Vec<RawClient>,
    pub applications: Vec<RawApplication>,
    pub certification_results: Vec<RawCertificationResult>,
    pub audit_events: Vec<RawAuditEvent>,
}

impl RawDataset {
    pub fn read_csv(dir: &Path) -> Result<Self, ValidationError> {
        let dataset = Self {
            clients: read_table(dir)?,
            applications: read_table(dir)?,
            certification_results: read_table(dir)?,
            audit_events: read_table(dir)?,
        };
        info!(
            clients = dataset.clients.len(),
            applications = dataset.applications.len(),
            certification_results = dataset.certification_results.len(),
            audit_events = dataset.audit_events.len(),
            "Loaded datasets for validation"
        );
        Ok(dataset)
    }
}

fn read_table<T: RawTable>(dir: &Path) -> Result<Vec<T>, ValidationError> {
    let path = dir.join(T::FILE);
    let read_error = |source| ValidationError::Read {
        path: path.clone(),
        source,
    };

    let mut reader = csv::Reader::from_path(&path).map_err(read_error)?;
    let headers = reader.headers().map_err(read_error)?.clone();
    if let Some(column) = T::COLUMNS
        .iter()
        .copied()
        .find(|column| !headers.iter().any(|h| h == *column))
    {
        return Err(ValidationError::MissingColumn {
            path: path.clone(),
            column,
        });
    }

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(read_error)
}

impl From<&Dataset> for RawDataset {
    fn from(dataset: &Dataset) -> Self {
        fn text<T: ToString + ?Sized>(value: &T) -> Option<String> {
            Some(value.to_string())
        }

        Self {
            clients: dataset
                .clients
                .iter()
                .map(|c| RawClient {
                    client_id: text(&c.client_id),
                    company_name: text(&c.company_name),
                    manufacturer_size: text(&c.manufacturer_size),
                    sector: text(&c.sector),
                })
                .collect(),
            applications: dataset
                .applications
                .iter()
                .map(|a| RawApplication {
                    application_id: text(&a.application_id),
                    client_id: text(&a.client_id),
                    submission_date: text(&a.submission_date),
                    instrument_type: text(&a.instrument_type),
                    mid_module: text(&a.mid_module),
                    risk_class: text(&a.risk_class),
                })
                .collect(),
            certification_results: dataset
                .certification_results
                .iter()
                .map(|r| RawCertificationResult {
                    application_id: text(&r.application_id),
                    passed_first_time: text(&u8::from(r.passed_first_time)),
                    total_revisions: text(&r.total_revisions),
                    certification_date: r.certification_date.map(|d| d.to_string()),
                })
                .collect(),
            audit_events: dataset
                .audit_events
                .iter()
                .map(|e| RawAuditEvent {
                    audit_id: text(&e.audit_id),
                    application_id: text(&e.application_id),
                    audit_date: text(&e.audit_date),
                    audit_status: text(&e.audit_status),
                    failure_reason: e.failure_reason.map(|r| r.to_string()),
                })
                .collect(),
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Ok,
        Severity::Info,
        Severity::Warning,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "✓",
            Severity::Info => "ℹ",
            Severity::Warning => "⚠",
            Severity::Critical => "✗",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckCategory {
    Completeness,
    Validity,
    Consistency,
    ReferentialIntegrity,
    BusinessRules,
}

impl CheckCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::Completeness => "Completeness",
            CheckCategory::Validity => "Validity",
            CheckCategory::Consistency => "Consistency",
            CheckCategory::ReferentialIntegrity => "Referential integrity",
            CheckCategory::BusinessRules => "Business rules",
        }
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    /// Dotted check number, e.g. `"3.5"`
    pub id: &'static str,
    pub name: &'static str,
    pub category: CheckCategory,
    pub passed: bool,
    /// Number of offending cells, rows or groups
    pub issues: usize,
    pub severity: Severity,
    pub details: Option<String>,
}

impl CheckResult {
    fn new(
        id: &'static str,
        name: &'static str,
        category: CheckCategory,
        issues: usize,
        severity_on_failure: Severity,
    ) -> Self {
        Self {
            id,
            name,
            category,
            passed: issues == 0,
            issues,
            severity: if issues == 0 {
                Severity::Ok
            } else {
                severity_on_failure
            },
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    PassWithWarnings,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::PassWithWarnings => "PASS WITH WARNINGS",
            Verdict::Fail => "FAIL",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Verdict::Pass => "✓ All checks passed",
            Verdict::PassWithWarnings => "⚠ Acceptable with warnings",
            Verdict::Fail => "✗ Critical issues found",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-severity tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    pub ok: usize,
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub results: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for result in &self.results {
            match result.severity {
                Severity::Ok => counts.ok += 1,
                Severity::Info => counts.info += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Critical => counts.critical += 1,
            }
        }
        counts
    }

    pub fn verdict(&self) -> Verdict {
        let counts = self.counts();
        if counts.critical > 0 {
            Verdict::Fail
        } else if counts.warning > 0 {
            Verdict::PassWithWarnings
        } else {
            Verdict::Pass
        }
    }

    pub fn get(&self, id: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "DATA QUALITY REPORT")?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;

        for r in &self.results {
            writeln!(
                f,
                "{} [{:8}] {} {}",
                r.severity.icon(),
                r.severity.as_str(),
                r.id,
                r.name
            )?;
            if r.issues > 0 {
                write!(f, "            Issues: {}", r.issues)?;
                if let Some(details) = &r.details {
                    write!(f, " ({details})")?;
                }
                writeln!(f)?;
            }
        }

        let counts = self.counts();
        writeln!(f)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "SUMMARY: {} checks", self.results.len())?;
        writeln!(
            f,
            "  ✓ OK: {}  ℹ INFO: {}  ⚠ WARN: {}  ✗ CRIT: {}",
            counts.ok, counts.info, counts.warning, counts.critical
        )?;
        writeln!(f)?;
        write!(f, "VERDICT: {}", self.verdict().message())
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Audit row with its date parsed once
struct AuditView<'a> {
    row: &'a RawAuditEvent,
    date: Option<NaiveDate>,
}

impl AuditView<'_> {
    /// Chronological key; unparseable dates sort last
    fn order_key(&self) -> (bool, Option<NaiveDate>) {
        (self.date.is_none(), self.date)
    }
}

pub struct Validator<'a> {
    data: &'a RawDataset,
    client_ids: HashSet<&'a str>,
    application_ids: HashSet<&'a str>,
    submissions: HashMap<&'a str, Option<NaiveDate>>,
    /// Audits per application, in file order
    audits: HashMap<&'a str, Vec<AuditView<'a>>>,
}

impl<'a> Validator<'a> {
    pub fn new(data: &'a RawDataset) -> Self {
        let client_ids = data
            .clients
            .iter()
            .filter_map(|c| c.client_id.as_deref())
            .collect();
        let application_ids = data
            .applications
            .iter()
            .filter_map(|a| a.application_id.as_deref())
            .collect();

        let mut submissions = HashMap::new();
        for app in &data.applications {
            if let Some(id) = app.application_id.as_deref() {
                submissions
                    .entry(id)
                    .or_insert_with(|| parse_date(&app.submission_date));
            }
        }

        let mut audits: HashMap<&str, Vec<AuditView>> = HashMap::new();
        for row in &data.audit_events {
            if let Some(id) = row.application_id.as_deref() {
                audits.entry(id).or_default().push(AuditView {
                    row,
                    date: parse_date(&row.audit_date),
                });
            }
        }

        Self {
            data,
            client_ids,
            application_ids,
            submissions,
            audits,
        }
    }

    /// Run every check in catalogue order
    pub fn run_all(&self) -> ValidationReport {
        let results = vec![
            self.check_client_fields(),
            self.check_application_fields(),
            self.check_certification_dates(),
            self.check_audit_dates(),
            self.check_id_formats(),
            self.check_categorical_values(),
            self.check_revision_counts(),
            self.check_binary_flags(),
            self.check_date_order(),
            self.check_turnaround_range(),
            self.check_audit_sequence(),
            self.check_pass_revision_consistency(),
            self.check_audit_count_consistency(),
            self.check_application_client_refs(),
            self.check_certification_application_refs(),
            self.check_audit_application_refs(),
            self.check_one_to_one_certification(),
            self.check_fail_has_reason(),
            self.check_pass_has_no_reason(),
            self.check_final_status_alignment(),
        ];

        for r in &results {
            if r.passed {
                debug!(check = r.id, name = r.name, severity = %r.severity, "Check passed");
            } else {
                warn!(check = r.id, name = r.name, severity = %r.severity, issues = r.issues, "Check failed");
            }
        }

        let report = ValidationReport { results };
        info!(verdict = %report.verdict(), "Validation finished");
        report
    }

    /// Final audit of an application: last in date order, file order on ties
    fn final_audit(&self, application_id: &str) -> Option<&AuditView<'a>> {
        self.audits.get(application_id).and_then(|audits| {
            audits
                .iter()
                .enumerate()
                .max_by_key(|(i, a)| (a.order_key(), *i))
                .map(|(_, a)| a)
        })
    }

    /// Dated certifications joined with their application's submission date
    fn turnarounds(&self) -> impl Iterator<Item = (NaiveDate, NaiveDate)> + '_ {
        self.data.certification_results.iter().filter_map(|cert| {
            let certified = parse_date(&cert.certification_date)?;
            let submitted = (*self.submissions.get(cert.application_id.as_deref()?)?)?;
            Some((submitted, certified))
        })
    }

    // --- 1. COMPLETENESS ---

    pub fn check_client_fields(&self) -> CheckResult {
        let missing: usize = self
            .data
            .clients
            .iter()
            .map(|c| {
                [
                    &c.client_id,
                    &c.company_name,
                    &c.manufacturer_size,
                    &c.sector,
                ]
                .iter()
                .filter(|cell| cell.is_none())
                .count()
            })
            .sum();
        CheckResult::new(
            "1.1",
            "Client fields complete",
            CheckCategory::Completeness,
            missing,
            Severity::Critical,
        )
    }

    /// Unparseable submission dates count as missing
    pub fn check_application_fields(&self) -> CheckResult {
        let missing: usize = self
            .data
            .applications
            .iter()
            .map(|a| {
                let text_missing = [
                    &a.application_id,
                    &a.client_id,
                    &a.instrument_type,
                    &a.mid_module,
                    &a.risk_class,
                ]
                .iter()
                .filter(|cell| cell.is_none())
                .count();
                text_missing + usize::from(parse_date(&a.submission_date).is_none())
            })
            .sum();
        CheckResult::new(
            "1.2",
            "Application fields complete",
            CheckCategory::Completeness,
            missing,
            Severity::Critical,
        )
    }

    /// A missing certification date is fine when the application's final
    /// audit is PENDING
    pub fn check_certification_dates(&self) -> CheckResult {
        let undated: Vec<&RawCertificationResult> = self
            .data
            .certification_results
            .iter()
            .filter(|c| parse_date(&c.certification_date).is_none())
            .collect();
        let explained = undated
            .iter()
            .filter(|c| {
                c.application_id
                    .as_deref()
                    .and_then(|id| self.final_audit(id))
                    .and_then(|a| a.row.audit_status.as_deref())
                    == Some(AuditStatus::Pending.as_str())
            })
            .count();
        let unexplained = undated.len() - explained;

        let severity = if unexplained > 0 {
            Severity::Critical
        } else if undated.is_empty() {
            Severity::Ok
        } else {
            Severity::Info
        };
        CheckResult {
            id: "1.3",
            name: "Certification dates",
            category: CheckCategory::Completeness,
            passed: unexplained == 0,
            issues: undated.len(),
            severity,
            details: Some(format!("{explained} legitimately pending")),
        }
    }

    pub fn check_audit_dates(&self) -> CheckResult {
        let missing = self
            .data
            .audit_events
            .iter()
            .filter(|a| parse_date(&a.audit_date).is_none())
            .count();
        CheckResult::new(
            "1.4",
            "Audit dates complete",
            CheckCategory::Completeness,
            missing,
            Severity::Critical,
        )
    }

    // --- 2. VALIDITY ---

    pub fn check_id_formats(&self) -> CheckResult {
        let issues = self
            .data
            .clients
            .iter()
            .filter(|c| !matches_id(&CLIENT_ID_RE, &c.client_id))
            .count()
            + self
                .data
                .applications
                .iter()
                .filter(|a| !matches_id(&APPLICATION_ID_RE, &a.application_id))
                .count()
            + self
                .data
                .audit_events
                .iter()
                .filter(|a| !matches_id(&AUDIT_ID_RE, &a.audit_id))
                .count();
        CheckResult::new(
            "2.1",
            "ID format validity",
            CheckCategory::Validity,
            issues,
            Severity::Warning,
        )
    }

    pub fn check_categorical_values(&self) -> CheckResult {
        let mut issues = 0;
        for client in &self.data.clients {
            issues += usize::from(!in_domain::<ManufacturerSize>(&client.manufacturer_size));
            issues += usize::from(!in_domain::<Sector>(&client.sector));
        }
        for app in &self.data.applications {
            issues += usize::from(!in_domain::<InstrumentType>(&app.instrument_type));
            issues += usize::from(!in_domain::<MidModule>(&app.mid_module));
            issues += usize::from(!in_domain::<RiskClass>(&app.risk_class));
        }
        for audit in &self.data.audit_events {
            issues += usize::from(!in_domain::<AuditStatus>(&audit.audit_status));
        }
        CheckResult::new(
            "2.2",
            "Categorical values valid",
            CheckCategory::Validity,
            issues,
            Severity::Critical,
        )
    }

    /// Negative or unreadable counts are critical; implausibly high ones a warning
    pub fn check_revision_counts(&self) -> CheckResult {
        let mut invalid = 0;
        let mut high = 0;
        for cert in &self.data.certification_results {
            match parse_int(&cert.total_revisions) {
                Some(n) if n < 0 => invalid += 1,
                Some(n) if n > MAX_REVISIONS => high += 1,
                Some(_) => {}
                None => invalid += 1,
            }
        }
        let severity = if invalid > 0 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        CheckResult::new(
            "2.3",
            "Revision counts valid",
            CheckCategory::Validity,
            invalid + high,
            severity,
        )
    }

    pub fn check_binary_flags(&self) -> CheckResult {
        let invalid = self
            .data
            .certification_results
            .iter()
            .filter(|c| !matches!(c.passed_first_time.as_deref(), Some("0" | "1")))
            .count();
        CheckResult::new(
            "2.4",
            "Binary flags valid",
            CheckCategory::Validity,
            invalid,
            Severity::Critical,
        )
    }

    // --- 3. CONSISTENCY ---

    pub fn check_date_order(&self) -> CheckResult {
        let violations = self
            .turnarounds()
            .filter(|(submitted, certified)| certified <= submitted)
            .count();
        CheckResult::new(
            "3.1",
            "Date order (submit → cert)",
            CheckCategory::Consistency,
            violations,
            Severity::Critical,
        )
    }

    pub fn check_turnaround_range(&self) -> CheckResult {
        let days: Vec<i64> = self
            .turnarounds()
            .map(|(submitted, certified)| (certified - submitted).num_days())
            .collect();
        let out_of_range = days
            .iter()
            .filter(|d| !(MIN_TURNAROUND_DAYS..=MAX_TURNAROUND_DAYS).contains(*d))
            .count();

        let result = CheckResult::new(
            "3.2",
            "Turnaround range",
            CheckCategory::Consistency,
            out_of_range,
            Severity::Warning,
        );
        match (days.iter().min(), days.iter().max()) {
            (Some(min), Some(max)) => result.with_details(format!("range: {min}-{max} days")),
            _ => result,
        }
    }

    pub fn check_audit_sequence(&self) -> CheckResult {
        let violations = self
            .audits
            .values()
            .filter(|audits| {
                audits
                    .windows(2)
                    .any(|w| w[0].order_key() > w[1].order_key())
            })
            .count();
        CheckResult::new(
            "3.3",
            "Audit date sequence",
            CheckCategory::Consistency,
            violations,
            Severity::Warning,
        )
    }

    pub fn check_pass_revision_consistency(&self) -> CheckResult {
        let bad = self
            .data
            .certification_results
            .iter()
            .filter(|c| {
                c.passed_first_time.as_deref() == Some("1")
                    && parse_int(&c.total_revisions).is_some_and(|n| n > 0)
            })
            .count();
        CheckResult::new(
            "3.4",
            "Pass/revision consistency",
            CheckCategory::Consistency,
            bad,
            Severity::Critical,
        )
    }

    /// Applications with no audits at all count as mismatches
    pub fn check_audit_count_consistency(&self) -> CheckResult {
        let mismatches = self
            .data
            .certification_results
            .iter()
            .filter(|c| {
                let Some(revisions) = parse_int(&c.total_revisions) else {
                    return false;
                };
                let audits = c
                    .application_id
                    .as_deref()
                    .and_then(|id| self.audits.get(id))
                    .map_or(0, Vec::len);
                i64::try_from(audits).map_or(true, |n| n != 1 + revisions)
            })
            .count();
        CheckResult::new(
            "3.5",
            "Audit count consistency",
            CheckCategory::Consistency,
            mismatches,
            Severity::Warning,
        )
    }

    // --- 4. REFERENTIAL INTEGRITY ---

    pub fn check_application_client_refs(&self) -> CheckResult {
        let orphans = self
            .data
            .applications
            .iter()
            .filter(|a| !references(&self.client_ids, &a.client_id))
            .count();
        CheckResult::new(
            "4.1",
            "App → Client ref",
            CheckCategory::ReferentialIntegrity,
            orphans,
            Severity::Critical,
        )
    }

    pub fn check_certification_application_refs(&self) -> CheckResult {
        let orphans = self
            .data
            .certification_results
            .iter()
            .filter(|c| !references(&self.application_ids, &c.application_id))
            .count();
        CheckResult::new(
            "4.2",
            "Cert → App ref",
            CheckCategory::ReferentialIntegrity,
            orphans,
            Severity::Critical,
        )
    }

    pub fn check_audit_application_refs(&self) -> CheckResult {
        let orphans = self
            .data
            .audit_events
            .iter()
            .filter(|a| !references(&self.application_ids, &a.application_id))
            .count();
        CheckResult::new(
            "4.3",
            "Audit → App ref",
            CheckCategory::ReferentialIntegrity,
            orphans,
            Severity::Critical,
        )
    }

    /// Applications without a result plus repeated result rows
    pub fn check_one_to_one_certification(&self) -> CheckResult {
        let mut seen: HashSet<Option<&str>> = HashSet::new();
        let duplicates = self
            .data
            .certification_results
            .iter()
            .filter(|c| !seen.insert(c.application_id.as_deref()))
            .count();
        let missing = self
            .application_ids
            .iter()
            .filter(|id| !seen.contains(&Some(*id)))
            .count();
        CheckResult::new(
            "4.4",
            "One-to-one app↔cert",
            CheckCategory::ReferentialIntegrity,
            missing + duplicates,
            Severity::Critical,
        )
    }

    // --- 5. BUSINESS RULES ---

    pub fn check_fail_has_reason(&self) -> CheckResult {
        let no_reason = self
            .data
            .audit_events
            .iter()
            .filter(|a| {
                a.audit_status.as_deref() == Some(AuditStatus::Fail.as_str())
                    && a.failure_reason.is_none()
            })
            .count();
        CheckResult::new(
            "5.1",
            "FAIL has reason",
            CheckCategory::BusinessRules,
            no_reason,
            Severity::Critical,
        )
    }

    pub fn check_pass_has_no_reason(&self) -> CheckResult {
        let with_reason = self
            .data
            .audit_events
            .iter()
            .filter(|a| {
                matches!(
                    a.audit_status.as_deref(),
                    Some(s) if s == AuditStatus::Pass.as_str() || s == AuditStatus::Pending.as_str()
                ) && a.failure_reason.is_some()
            })
            .count();
        CheckResult::new(
            "5.2",
            "PASS/PENDING has no reason",
            CheckCategory::BusinessRules,
            with_reason,
            Severity::Warning,
        )
    }

    /// Certified => final audit PASS; uncertified => final audit PENDING
    pub fn check_final_status_alignment(&self) -> CheckResult {
        let misaligned = self
            .data
            .certification_results
            .iter()
            .filter(|c| {
                let Some(last) = c.application_id.as_deref().and_then(|id| self.final_audit(id))
                else {
                    return false;
                };
                let expected = if parse_date(&c.certification_date).is_some() {
                    AuditStatus::Pass
                } else {
                    AuditStatus::Pending
                };
                last.row.audit_status.as_deref() != Some(expected.as_str())
            })
            .count();
        CheckResult::new(
            "5.3",
            "Final audit↔cert alignment",
            CheckCategory::BusinessRules,
            misaligned,
            Severity::Critical,
        )
    }
}

/// Read the CSV files in `dir` and run every check
pub fn validate_dir(dir: &Path) -> Result<ValidationReport, ValidationError> {
    let data = RawDataset::read_csv(dir)?;
    Ok(Validator::new(&data).run_all())
}

fn parse_date(cell: &Option<String>) -> Option<NaiveDate> {
    cell.as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
}

fn parse_int(cell: &Option<String>) -> Option<i64> {
    cell.as_deref().and_then(|s| s.trim().parse().ok())
}

fn matches_id(pattern: &Regex, cell: &Option<String>) -> bool {
    cell.as_deref().is_some_and(|id| pattern.is_match(id))
}

fn in_domain<T: std::str::FromStr>(cell: &Option<String>) -> bool {
    cell.as_deref().is_some_and(|s| s.parse::<T>().is_ok())
}

fn references(ids: &HashSet<&str>, cell: &Option<String>) -> bool {
    cell.as_deref().is_some_and(|id| ids.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::synth::generate_dataset;

    fn reference() -> RawDataset {
        RawDataset::from(&generate_dataset(&GenerationConfig::default()).unwrap())
    }

    fn run(data: &RawDataset) -> ValidationReport {
        Validator::new(data).run_all()
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_reference_dataset_has_no_critical_findings() {
        let report = run(&reference());
        assert_eq!(report.results.len(), 20);
        assert_eq!(report.counts().critical, 0, "{report}");
        assert_ne!(report.verdict(), Verdict::Fail);
        assert!(report.results.iter().all(|r| r.passed), "{report}");
    }

    #[test]
    fn test_pending_dates_are_informational() {
        let report = run(&reference());
        let check = report.get("1.3").unwrap();
        assert!(check.passed);
        if check.issues > 0 {
            assert_eq!(check.severity, Severity::Info);
            assert_eq!(
                check.details.as_deref(),
                Some(format!("{} legitimately pending", check.issues).as_str())
            );
        }
    }

    #[test]
    fn test_unexplained_missing_date_is_critical() {
        let mut data = reference();
        let cert = data
            .certification_results
            .iter_mut()
            .find(|c| c.certification_date.is_some())
            .unwrap();
        cert.certification_date = None;

        let report = run(&data);
        assert_eq!(report.get("1.3").unwrap().severity, Severity::Critical);
        assert_eq!(report.get("5.3").unwrap().issues, 1);
        assert_eq!(report.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_fail_without_reason_is_critical() {
        let mut data = reference();
        let audit = data
            .audit_events
            .iter_mut()
            .find(|a| a.audit_status.as_deref() == Some("FAIL"))
            .unwrap();
        audit.failure_reason = None;

        let check = run(&data).get("5.1").cloned().unwrap();
        assert_eq!(check.issues, 1);
        assert_eq!(check.severity, Severity::Critical);
    }

    #[test]
    fn test_pass_with_reason_is_a_warning() {
        let mut data = reference();
        let audit = data
            .audit_events
            .iter_mut()
            .find(|a| a.audit_status.as_deref() == Some("PASS"))
            .unwrap();
        audit.failure_reason = some("Technical file incomplete");

        let report = run(&data);
        assert_eq!(report.get("5.2").unwrap().severity, Severity::Warning);
        assert_eq!(report.verdict(), Verdict::PassWithWarnings);
    }

    #[test]
    fn test_bad_ids_and_categories() {
        let mut data = reference();
        data.clients[0].client_id = some("C-1");
        data.applications[0].mid_module = some("Z");
        data.audit_events[0].audit_status = some("pass");

        let report = run(&data);
        assert!(report.get("2.1").unwrap().issues >= 1);
        assert_eq!(report.get("2.1").unwrap().severity, Severity::Warning);
        assert_eq!(report.get("2.2").unwrap().issues, 2);
        assert_eq!(report.get("2.2").unwrap().severity, Severity::Critical);
    }

    #[test]
    fn test_revision_count_severities() {
        let mut data = reference();
        data.certification_results[0].total_revisions = some("11");
        let report = run(&data);
        assert_eq!(report.get("2.3").unwrap().severity, Severity::Warning);

        data.certification_results[1].total_revisions = some("-1");
        let report = run(&data);
        let check = report.get("2.3").unwrap();
        assert_eq!(check.issues, 2);
        assert_eq!(check.severity, Severity::Critical);
    }

    #[test]
    fn test_first_time_pass_with_revisions() {
        let mut data = reference();
        let cert = data
            .certification_results
            .iter_mut()
            .find(|c| c.passed_first_time.as_deref() == Some("0"))
            .unwrap();
        cert.passed_first_time = some("1");
        assert_eq!(run(&data).get("3.4").unwrap().issues, 1);

        data.certification_results[0].passed_first_time = some("yes");
        assert_eq!(run(&data).get("2.4").unwrap().issues, 1);
    }

    #[test]
    fn test_orphans_and_duplicates() {
        let mut data = reference();
        data.applications[0].client_id = some("CLI9999");
        data.audit_events[0].application_id = some("APP99999");
        let duplicate = data.certification_results[0].clone();
        data.certification_results.push(duplicate);
        data.certification_results.remove(1);

        let report = run(&data);
        assert_eq!(report.get("4.1").unwrap().issues, 1);
        assert_eq!(report.get("4.3").unwrap().issues, 1);
        assert_eq!(report.get("4.4").unwrap().issues, 2);
    }

    #[test]
    fn test_audit_count_counts_missing_audits() {
        let mut data = reference();
        let target = data.certification_results[0].application_id.clone();
        data.audit_events.retain(|a| a.application_id != target);

        let check = run(&data).get("3.5").cloned().unwrap();
        assert_eq!(check.issues, 1);
        assert_eq!(check.severity, Severity::Warning);
    }

    #[test]
    fn test_out_of_order_audits() {
        let mut data = reference();
        let cert = data
            .certification_results
            .iter()
            .find(|c| c.total_revisions.as_deref() == Some("2"))
            .unwrap()
            .clone();
        let positions: Vec<usize> = data
            .audit_events
            .iter()
            .enumerate()
            .filter(|(_, a)| a.application_id == cert.application_id)
            .map(|(i, _)| i)
            .collect();
        let first = positions[0];
        let last = positions[2];
        let first_date = data.audit_events[first].audit_date.clone();
        data.audit_events[first].audit_date = data.audit_events[last].audit_date.clone();
        data.audit_events[last].audit_date = first_date;

        let report = run(&data);
        assert_eq!(report.get("3.3").unwrap().issues, 1);
        // The PASS row is no longer the latest audit
        assert_eq!(report.get("5.3").unwrap().issues, 1);
    }

    #[test]
    fn test_turnaround_out_of_range() {
        let mut data = reference();
        let cert = data
            .certification_results
            .iter_mut()
            .find(|c| c.certification_date.is_some())
            .unwrap();
        cert.certification_date = some("2030-01-01");

        let check = run(&data).get("3.2").cloned().unwrap();
        assert_eq!(check.issues, 1);
        assert_eq!(check.severity, Severity::Warning);
        assert!(check.details.unwrap().starts_with("range: "));
    }

    #[test]
    fn test_report_rendering() {
        let rendered = run(&reference()).to_string();
        assert!(rendered.starts_with(&"=".repeat(60)));
        assert!(rendered.contains("DATA QUALITY REPORT"));
        assert!(rendered.contains("[OK      ] 1.1 Client fields complete"));
        assert!(rendered.contains("SUMMARY: 20 checks"));
        assert!(rendered.contains("VERDICT: "));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        generate_dataset(&GenerationConfig {
            num_clients: 3,
            num_applications: 5,
            ..GenerationConfig::default()
        })
        .unwrap()
        .write_csv(dir.path())
        .unwrap();
        std::fs::write(
            dir.path().join(CLIENTS_FILE),
            "client_id,company_name,sector\nCLI0001,Nova Meters Ltd,Energy\n",
        )
        .unwrap();

        let err = validate_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingColumn {
                column: "manufacturer_size",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_cells_read_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = generate_dataset(&GenerationConfig {
            num_clients: 3,
            num_applications: 5,
            ..GenerationConfig::default()
        })
        .unwrap();
        dataset.write_csv(dir.path()).unwrap();
        std::fs::write(
            dir.path().join(CLIENTS_FILE),
            "client_id,company_name,manufacturer_size,sector\nCLI0001,,SME,Energy\nCLI0002,A B Ltd,Large,Energy\nCLI0003,C D GmbH,SME,Utilities\n",
        )
        .unwrap();

        let report = validate_dir(dir.path()).unwrap();
        assert_eq!(report.get("1.1").unwrap().issues, 1);
        assert_eq!(report.verdict(), Verdict::Fail);
    }
}
