//! Pre-audit checklist
//!
//! Failure reasons are ranked by how often they were raised, split into
//! priority tiers by cumulative share (Pareto style) and mapped to a
//! remediation action. The ranking and tiering are pure functions over
//! counts; the database side only supplies the counts.
//!
//! Ranking order: count descending, then catalogue order of the reason
//! (module B reasons before module D reasons), then unknown reasons
//! alphabetically.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use cert_types::{FailureReason, MidModule};

use crate::error::ChecklistError;
use crate::report::banner;

/// Cumulative share up to which reasons are HIGH priority
pub const HIGH_PRIORITY_CUTOFF_PCT: i64 = 50;
/// Cumulative share up to which reasons are MEDIUM priority
pub const MEDIUM_PRIORITY_CUTOFF_PCT: i64 = 80;

/// Share of top-3 failures assumed preventable by the checklist
pub const PREVENTION_RATE: f64 = 0.5;
/// Turnaround cost of one failed audit
pub const DAYS_PER_FAILURE: i64 = 12;
/// Share of prevented failures that turn into first-time passes
pub const RECOVERY_RATE: f64 = 0.8;
/// Reasons the what-if projection assumes are mitigated
pub const PROJECTION_TOP_REASONS: usize = 3;

const CHECKLIST_WIDTH: usize = 70;

// ============================================================================
// RANKING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    /// Tier for a running total; a boundary hit belongs to the higher tier.
    ///
    /// Compares integer counts (`cumulative * 100 <= cutoff * total`) instead
    /// of a running sum of rounded percentages, so an exact 50% or 80% share
    /// cannot drift into the next tier.
    pub fn for_cumulative(cumulative: i64, total: i64) -> Self {
        if cumulative * 100 <= HIGH_PRIORITY_CUTOFF_PCT * total {
            Priority::High
        } else if cumulative * 100 <= MEDIUM_PRIORITY_CUTOFF_PCT * total {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occurrences of one failure reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonCount {
    pub reason: String,
    pub count: i64,
}

impl ReasonCount {
    pub fn new(reason: impl Into<String>, count: i64) -> Self {
        Self {
            reason: reason.into(),
            count,
        }
    }
}

/// Sort key for a reason label: catalogue position, unknown labels last
fn catalogue_position(reason: &str) -> usize {
    reason
        .parse::<FailureReason>()
        .ok()
        .and_then(|known| FailureReason::ALL.iter().position(|r| *r == known))
        .unwrap_or(usize::MAX)
}

/// Sort counts into checklist order
pub fn rank_reasons(mut counts: Vec<ReasonCount>) -> Vec<ReasonCount> {
    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| catalogue_position(&a.reason).cmp(&catalogue_position(&b.reason)))
            .then_with(|| a.reason.cmp(&b.reason))
    });
    counts
}

/// Remediation action for a failure reason
pub fn remediation_action(reason: &str) -> Cow<'static, str> {
    use FailureReason::*;

    let action = match reason.parse::<FailureReason>() {
        Ok(TechnicalFileIncomplete) => {
            "Verify technical file contains all sections per MID Annex requirements"
        }
        Ok(DocumentationInconsistencies) => {
            "Cross-check all document references and version numbers"
        }
        Ok(TestReportGaps) => "Confirm test reports cover all applicable MID essential requirements",
        Ok(MetrologicalRequirementsUnclear) => {
            "Review metrological characteristics against MID Annex MI-001 to MI-010"
        }
        Ok(SoftwareDocumentationMissing) => {
            "Include software architecture, version control, and validation records"
        }
        Ok(DurabilityEvidenceInsufficient) => {
            "Provide durability test results or field performance data"
        }
        Ok(MarkingLabellingNonCompliant) => {
            "Check CE marking, NB number, and instrument labelling requirements"
        }
        Ok(EmcTestResultsMissing) => "Include EMC test reports per EN 61326 or equivalent",
        Ok(TrainingRecordsMissing) => "Verify training records for all personnel in scope",
        Ok(InternalAuditGaps) => "Review internal audit schedule and findings closure",
        Ok(CalibrationRecordsOutdated) => "Check calibration status of all measurement equipment",
        Ok(NonConformanceHandlingUnclear) => {
            "Document NCR process with examples of recent closures"
        }
        Ok(ProductionProcessNotDocumented) => "Map production process with quality control points",
        Ok(SupplierControlInsufficient) => "Include approved supplier list and evaluation records",
        Ok(ManagementReviewIncomplete) => "Provide recent management review minutes with actions",
        Ok(CorrectiveActionRecordsMissing) => "Document CAPA process with closure evidence",
        Err(_) => return Cow::Owned(format!("Review: {reason}")),
    };
    Cow::Borrowed(action)
}

// ============================================================================
// CHECKLIST
// ============================================================================

/// Which audits a checklist is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecklistScope {
    All,
    Module(MidModule),
}

impl ChecklistScope {
    pub const ALL: [ChecklistScope; 3] = [
        ChecklistScope::All,
        ChecklistScope::Module(MidModule::B),
        ChecklistScope::Module(MidModule::D),
    ];

    pub fn module(&self) -> Option<MidModule> {
        match self {
            ChecklistScope::All => None,
            ChecklistScope::Module(module) => Some(*module),
        }
    }

    pub fn title(&self) -> String {
        match self {
            ChecklistScope::All => "All Modules".to_string(),
            ChecklistScope::Module(module) => format!("Module {module}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChecklistItem {
    pub reason: String,
    pub count: i64,
    pub pct: f64,
    pub cumulative_pct: f64,
    pub priority: Priority,
    pub action: Cow<'static, str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checklist {
    pub scope: ChecklistScope,
    pub total_failures: i64,
    pub items: Vec<ChecklistItem>,
}

impl Checklist {
    /// Rank the counts and assign tiers and actions
    pub fn from_counts(scope: ChecklistScope, counts: Vec<ReasonCount>) -> Self {
        let ranked = rank_reasons(counts);
        let total: i64 = ranked.iter().map(|r| r.count).sum();

        let mut cumulative = 0;
        let items = ranked
            .into_iter()
            .map(|r| {
                cumulative += r.count;
                ChecklistItem {
                    pct: share_pct(r.count, total),
                    cumulative_pct: share_pct(cumulative, total),
                    priority: Priority::for_cumulative(cumulative, total),
                    action: remediation_action(&r.reason),
                    reason: r.reason,
                    count: r.count,
                }
            })
            .collect();

        Self {
            scope,
            total_failures: total,
            items,
        }
    }

    pub fn items_with(&self, priority: Priority) -> impl Iterator<Item = &ChecklistItem> {
        self.items.iter().filter(move |i| i.priority == priority)
    }
}

impl fmt::Display for Checklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            banner(
                &format!("PRE-AUDIT CHECKLIST: {}", self.scope.title()),
                CHECKLIST_WIDTH
            )
        )?;
        if self.items.is_empty() {
            return write!(f, "\n\nNo failures recorded.");
        }
        for priority in Priority::ALL {
            let mut items = self.items_with(priority).peekable();
            if items.peek().is_none() {
                continue;
            }
            write!(f, "\n\n[{priority} PRIORITY]")?;
            for item in items {
                write!(f, "\n\n  □ {}", item.action)?;
                write!(f, "\n    Issue: {}", item.reason)?;
                write!(f, "\n    Frequency: {} ({:.1}%)", item.count, item.pct)?;
            }
        }
        Ok(())
    }
}

fn share_pct(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// ANALYSIS
// ============================================================================

/// Failure volume overview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAnalysis {
    pub total_failures: i64,
    pub affected_applications: i64,
    pub by_module: Vec<(String, i64)>,
}

impl fmt::Display for FailureAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total audit failures: {}", self.total_failures)?;
        writeln!(f, "Applications affected: {}", self.affected_applications)?;
        write!(f, "\nBy module:")?;
        for (module, failures) in &self.by_module {
            write!(f, "\n  Module {module}: {failures} failures")?;
        }
        Ok(())
    }
}

/// Average turnaround for one revision count
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionImpact {
    pub total_revisions: i64,
    pub avg_days: f64,
    pub apps: i64,
}

impl RevisionImpact {
    /// Days added over the first-time-pass baseline
    pub fn days_added(&self, baseline: f64) -> f64 {
        self.avg_days - baseline
    }

    pub fn days_per_revision(&self, baseline: f64) -> f64 {
        self.days_added(baseline) / self.total_revisions as f64
    }
}

/// Turnaround cost of failures
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactAnalysis {
    pub first_time_avg_days: Option<f64>,
    pub with_failures_avg_days: Option<f64>,
    pub by_revisions: Vec<RevisionImpact>,
}

impl ImpactAnalysis {
    pub fn delay_per_failure(&self) -> Option<f64> {
        Some(self.with_failures_avg_days? - self.first_time_avg_days?)
    }
}

impl fmt::Display for ImpactAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1} days"));

        writeln!(
            f,
            "Avg turnaround (first-time pass): {}",
            days(self.first_time_avg_days)
        )?;
        writeln!(
            f,
            "Avg turnaround (with failures):   {}",
            days(self.with_failures_avg_days)
        )?;
        write!(
            f,
            "Delay caused by failures:         {}",
            days(self.delay_per_failure())
        )?;

        if let Some(baseline) = self.first_time_avg_days {
            write!(f, "\n\nDays added per revision:")?;
            for r in &self.by_revisions {
                write!(
                    f,
                    "\n  {} revisions: +{:.0} days (~{:.0} days/revision)",
                    r.total_revisions,
                    r.days_added(baseline),
                    r.days_per_revision(baseline)
                )?;
            }
        }
        Ok(())
    }
}

/// Outcome totals over completed applications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeStats {
    pub total_apps: i64,
    pub failed_apps: i64,
    pub total_revisions: i64,
}

/// What-if projection for mitigating the most frequent failure reasons
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsEstimate {
    pub outcomes: OutcomeStats,
    pub total_failures: i64,
    pub top_failures: i64,
    pub failures_prevented: i64,
    pub days_saved: i64,
    pub current_success_pct: Option<f64>,
    pub projected_success_pct: Option<f64>,
}

impl SavingsEstimate {
    /// Project the effect of mitigating the top reasons.
    ///
    /// `ranked` must be in checklist order. Prevented failures are
    /// `floor(top * PREVENTION_RATE)` on the integer count, not a product of
    /// rounded shares. Recovered applications are
    /// `prevented * RECOVERY_RATE` capped at `failed_apps`, so the projected
    /// success rate never exceeds 100% even when one application failed
    /// several times.
    pub fn project(outcomes: OutcomeStats, ranked: &[ReasonCount]) -> Self {
        let total_failures: i64 = ranked.iter().map(|r| r.count).sum();
        let top_failures: i64 = ranked
            .iter()
            .take(PROJECTION_TOP_REASONS)
            .map(|r| r.count)
            .sum();

        // total * (top / total) * rate, kept exact for integer counts
        let failures_prevented = (top_failures as f64 * PREVENTION_RATE).floor() as i64;
        let recovered = (failures_prevented as f64 * RECOVERY_RATE).min(outcomes.failed_apps as f64);

        let rate = |passes: f64| {
            (outcomes.total_apps > 0).then(|| passes / outcomes.total_apps as f64 * 100.0)
        };
        let current_passes = (outcomes.total_apps - outcomes.failed_apps) as f64;

        Self {
            outcomes,
            total_failures,
            top_failures,
            failures_prevented,
            days_saved: failures_prevented * DAYS_PER_FAILURE,
            current_success_pct: rate(current_passes),
            projected_success_pct: rate(current_passes + recovered),
        }
    }
}

impl fmt::Display for SavingsEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"));

        write!(f, "{}", banner("POTENTIAL IMPACT", CHECKLIST_WIDTH))?;
        write!(f, "\n\nCurrent state:")?;
        write!(
            f,
            "\n  Applications with failures: {}",
            self.outcomes.failed_apps
        )?;
        write!(f, "\n  Total revisions: {}", self.outcomes.total_revisions)?;
        write!(
            f,
            "\n\nIf checklist prevents {:.0}% of top {} issues:",
            PREVENTION_RATE * 100.0,
            PROJECTION_TOP_REASONS
        )?;
        write!(f, "\n  Failures prevented: ~{}", self.failures_prevented)?;
        write!(f, "\n  Days saved: ~{}", self.days_saved)?;
        write!(
            f,
            "\n\n  Current success rate:   {}",
            pct(self.current_success_pct)
        )?;
        write!(
            f,
            "\n  Projected success rate: {}",
            pct(self.projected_success_pct)
        )
    }
}

// ============================================================================
// EXPORT
// ============================================================================

/// One row of `checklist_items.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub failure_reason: String,
    pub module: String,
    pub occurrence_count: i64,
    pub percentage_of_total: f64,
    pub remediation_text: String,
}

/// Build export rows from per-(reason, module) counts
pub fn export_rows(counts: Vec<(String, String, i64)>) -> Vec<ExportRow> {
    let total: i64 = counts.iter().map(|(_, _, n)| n).sum();
    let mut rows: Vec<ExportRow> = counts
        .into_iter()
        .map(|(reason, module, count)| ExportRow {
            percentage_of_total: round1(share_pct(count, total)),
            remediation_text: remediation_action(&reason).into_owned(),
            failure_reason: reason,
            module,
            occurrence_count: count,
        })
        .collect();
    rows.sort_by(|a, b| {
        (
            Reverse(a.occurrence_count),
            catalogue_position(&a.failure_reason),
            &a.failure_reason,
            &a.module,
        )
            .cmp(&(
                Reverse(b.occurrence_count),
                catalogue_position(&b.failure_reason),
                &b.failure_reason,
                &b.module,
            ))
    });
    rows
}

pub fn write_export(path: &Path, rows: &[ExportRow]) -> Result<(), ChecklistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ChecklistError::Flush {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let export_error = |source| ChecklistError::Export {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(export_error)?;
    for row in rows {
        writer.serialize(row).map_err(export_error)?;
    }
    writer.flush().map_err(|source| ChecklistError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// DATABASE QUERIES
// ============================================================================

#[cfg(feature = "database")]
pub use queries::*;

#[cfg(feature = "database")]
mod queries {
    use sqlx::SqlitePool;
    use tracing::info;

    use super::*;
    use crate::error::StoreError;

    fn query_error(query: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
        move |source| StoreError::Query { query, source }
    }

    /// Failure counts per reason, optionally restricted to one module
    pub async fn failure_counts(
        pool: &SqlitePool,
        module: Option<MidModule>,
    ) -> Result<Vec<ReasonCount>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT failure_reason, COUNT(*)
            FROM failures
            WHERE ?1 IS NULL OR mid_module = ?1
            GROUP BY failure_reason
            "#,
        )
        .bind(module.map(|m| m.as_str()))
        .fetch_all(pool)
        .await
        .map_err(query_error("failure counts"))?;

        Ok(rows
            .into_iter()
            .map(|(reason, count)| ReasonCount::new(reason, count))
            .collect())
    }

    pub async fn build_checklist(
        pool: &SqlitePool,
        scope: ChecklistScope,
    ) -> Result<Checklist, StoreError> {
        let checklist = Checklist::from_counts(scope, failure_counts(pool, scope.module()).await?);
        info!(
            scope = %scope.title(),
            reasons = checklist.items.len(),
            high = checklist.items_with(Priority::High).count(),
            "Built checklist"
        );
        Ok(checklist)
    }

    pub async fn analyze_failures(pool: &SqlitePool) -> Result<FailureAnalysis, StoreError> {
        let (total_failures, affected_applications): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT application_id) FROM failures",
        )
        .fetch_one(pool)
        .await
        .map_err(query_error("failure totals"))?;

        let by_module: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT mid_module, COUNT(*)
            FROM failures
            GROUP BY mid_module
            ORDER BY mid_module
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(query_error("failures by module"))?;

        Ok(FailureAnalysis {
            total_failures,
            affected_applications,
            by_module,
        })
    }

    pub async fn impact_analysis(pool: &SqlitePool) -> Result<ImpactAnalysis, StoreError> {
        let (with_failures_avg_days, first_time_avg_days): (Option<f64>, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT
                    ROUND(AVG(CASE WHEN passed_first_time = 0 THEN turnaround_days END), 1),
                    ROUND(AVG(CASE WHEN passed_first_time = 1 THEN turnaround_days END), 1)
                FROM application_details
                WHERE certification_date IS NOT NULL
                "#,
            )
            .fetch_one(pool)
            .await
            .map_err(query_error("turnaround impact"))?;

        let by_revisions: Vec<(i64, f64, i64)> = sqlx::query_as(
            r#"
            SELECT total_revisions, ROUND(AVG(turnaround_days), 1), COUNT(*)
            FROM application_details
            WHERE certification_date IS NOT NULL AND total_revisions > 0
            GROUP BY total_revisions
            ORDER BY total_revisions
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(query_error("revision impact"))?;

        Ok(ImpactAnalysis {
            first_time_avg_days,
            with_failures_avg_days,
            by_revisions: by_revisions
                .into_iter()
                .map(|(total_revisions, avg_days, apps)| RevisionImpact {
                    total_revisions,
                    avg_days,
                    apps,
                })
                .collect(),
        })
    }

    pub async fn outcome_stats(pool: &SqlitePool) -> Result<OutcomeStats, StoreError> {
        let (total_apps, failed_apps, total_revisions): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN passed_first_time = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(total_revisions), 0)
            FROM certification_results
            WHERE certification_date IS NOT NULL
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(query_error("outcome totals"))?;

        Ok(OutcomeStats {
            total_apps,
            failed_apps,
            total_revisions,
        })
    }

    pub async fn estimate_savings(pool: &SqlitePool) -> Result<SavingsEstimate, StoreError> {
        let outcomes = outcome_stats(pool).await?;
        let ranked = rank_reasons(failure_counts(pool, None).await?);
        Ok(SavingsEstimate::project(outcomes, &ranked))
    }

    /// Rows for `checklist_items.csv`, grouped by (reason, module)
    pub async fn load_export_rows(pool: &SqlitePool) -> Result<Vec<ExportRow>, StoreError> {
        let counts: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT failure_reason, mid_module, COUNT(*)
            FROM failures
            GROUP BY failure_reason, mid_module
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(query_error("checklist export"))?;
        Ok(export_rows(counts))
    }
}
