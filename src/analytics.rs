//! KPI queries over the certification database
//!
//! Five families of read-only aggregate queries plus the executive summary.
//! Family queries return loosely typed [`ReportTable`]s for display; the
//! summary and module comparison decode into typed rows.

use std::fmt;

use sqlx::sqlite::SqliteRow;
use sqlx::{Column, FromRow, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use crate::checklist::{failure_counts, rank_reasons, ReasonCount};
use crate::error::StoreError;

// ============================================================================
// TABLE VALUES
// ============================================================================

/// A single result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::Real(_))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Real(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            Cell::Real(v) => write!(f, "{v}"),
            Cell::Text(v) => f.write_str(v),
        }
    }
}

/// Titled query result
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ReportTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a named column
    pub fn values(&self, name: &str) -> Vec<&Cell> {
        match self.column(name) {
            Some(index) => self.rows.iter().filter_map(|row| row.get(index)).collect(),
            None => Vec::new(),
        }
    }
}

// ============================================================================
// KPI CATALOGUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KpiQuery {
    pub id: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KpiFamily {
    SuccessRate,
    Turnaround,
    Revisions,
    FailureRate,
    Throughput,
}

impl KpiFamily {
    pub const ALL: [KpiFamily; 5] = [
        KpiFamily::SuccessRate,
        KpiFamily::Turnaround,
        KpiFamily::Revisions,
        KpiFamily::FailureRate,
        KpiFamily::Throughput,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            KpiFamily::SuccessRate => "KPI 1: First-time success rate",
            KpiFamily::Turnaround => "KPI 2: Turnaround time",
            KpiFamily::Revisions => "KPI 3: Revisions",
            KpiFamily::FailureRate => "KPI 4: Audit failure rate",
            KpiFamily::Throughput => "KPI 5: Throughput",
        }
    }

    pub fn queries(&self) -> &'static [KpiQuery] {
        match self {
            KpiFamily::SuccessRate => SUCCESS_RATE,
            KpiFamily::Turnaround => TURNAROUND,
            KpiFamily::Revisions => REVISIONS,
            KpiFamily::FailureRate => FAILURE_RATE,
            KpiFamily::Throughput => THROUGHPUT,
        }
    }
}

const SUCCESS_RATE: &[KpiQuery] = &[
    KpiQuery {
        id: "1a",
        title: "Overall Success Rate",
        sql: r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(passed_first_time), 0) AS first_time_passes,
                ROUND(AVG(passed_first_time) * 100, 1) AS success_pct
            FROM certification_results
            WHERE certification_date IS NOT NULL
        "#,
    },
    KpiQuery {
        id: "1b",
        title: "Success by Module",
        sql: r#"
            SELECT
                a.mid_module,
                COUNT(*) AS apps,
                ROUND(AVG(cr.passed_first_time) * 100, 1) AS success_pct
            FROM applications a
            JOIN certification_results cr ON a.application_id = cr.application_id
            WHERE cr.certification_date IS NOT NULL
            GROUP BY a.mid_module
            ORDER BY success_pct DESC, a.mid_module
        "#,
    },
    KpiQuery {
        id: "1c",
        title: "Success by Manufacturer Size",
        sql: r#"
            SELECT
                c.manufacturer_size,
                COUNT(*) AS apps,
                ROUND(AVG(cr.passed_first_time) * 100, 1) AS success_pct
            FROM clients c
            JOIN applications a ON c.client_id = a.client_id
            JOIN certification_results cr ON a.application_id = cr.application_id
            WHERE cr.certification_date IS NOT NULL
            GROUP BY c.manufacturer_size
            ORDER BY success_pct DESC, c.manufacturer_size
        "#,
    },
    KpiQuery {
        id: "1d",
        title: "Success by Instrument",
        sql: r#"
            SELECT
                a.instrument_type,
                COUNT(*) AS apps,
                ROUND(AVG(cr.passed_first_time) * 100, 1) AS success_pct
            FROM applications a
            JOIN certification_results cr ON a.application_id = cr.application_id
            WHERE cr.certification_date IS NOT NULL
            GROUP BY a.instrument_type
            ORDER BY success_pct DESC, a.instrument_type
        "#,
    },
];

const TURNAROUND: &[KpiQuery] = &[
    KpiQuery {
        id: "2a",
        title: "Overall Turnaround",
        sql: r#"
            SELECT
                COUNT(*) AS completed,
                ROUND(AVG(turnaround_days), 1) AS avg_days,
                MIN(turnaround_days) AS min_days,
                MAX(turnaround_days) AS max_days
            FROM application_details
            WHERE certification_date IS NOT NULL
        "#,
    },
    KpiQuery {
        id: "2b",
        title: "Turnaround by Module",
        sql: r#"
            SELECT
                mid_module,
                COUNT(*) AS completed,
                ROUND(AVG(turnaround_days), 1) AS avg_days
            FROM application_details
            WHERE certification_date IS NOT NULL
            GROUP BY mid_module
            ORDER BY mid_module
        "#,
    },
    KpiQuery {
        id: "2c",
        title: "First-Time Pass vs Revisions",
        sql: r#"
            SELECT
                CASE WHEN passed_first_time = 1 THEN 'First-time' ELSE 'Revisions' END AS outcome,
                COUNT(*) AS apps,
                ROUND(AVG(turnaround_days), 1) AS avg_days
            FROM application_details
            WHERE certification_date IS NOT NULL
            GROUP BY passed_first_time
            ORDER BY passed_first_time DESC
        "#,
    },
    KpiQuery {
        id: "2d",
        title: "Turnaround by Revision Count",
        sql: r#"
            SELECT
                total_revisions,
                COUNT(*) AS apps,
                ROUND(AVG(turnaround_days), 1) AS avg_days
            FROM application_details
            WHERE certification_date IS NOT NULL
            GROUP BY total_revisions
            ORDER BY total_revisions
        "#,
    },
];

const REVISIONS: &[KpiQuery] = &[
    KpiQuery {
        id: "3a",
        title: "Revisions by Manufacturer Size",
        sql: r#"
            SELECT
                c.manufacturer_size,
                COUNT(DISTINCT c.client_id) AS clients,
                SUM(cr.total_revisions) AS total_revs,
                ROUND(AVG(cr.total_revisions), 2) AS avg_per_app
            FROM clients c
            JOIN applications a ON c.client_id = a.client_id
            JOIN certification_results cr ON a.application_id = cr.application_id
            GROUP BY c.manufacturer_size
            ORDER BY c.manufacturer_size
        "#,
    },
    KpiQuery {
        id: "3b",
        title: "Top 10 Clients by Revisions",
        sql: r#"
            SELECT
                c.company_name,
                c.manufacturer_size AS size,
                COUNT(*) AS apps,
                SUM(cr.total_revisions) AS revisions
            FROM clients c
            JOIN applications a ON c.client_id = a.client_id
            JOIN certification_results cr ON a.application_id = cr.application_id
            GROUP BY c.client_id
            ORDER BY revisions DESC, c.client_id
            LIMIT 10
        "#,
    },
    KpiQuery {
        id: "3c",
        title: "Revision Distribution",
        sql: r#"
            SELECT
                total_revisions AS revs,
                COUNT(*) AS apps,
                ROUND(COUNT(*) * 100.0 / (SELECT COUNT(*) FROM certification_results), 1) AS pct
            FROM certification_results
            GROUP BY total_revisions
            ORDER BY total_revisions
        "#,
    },
];

const FAILURE_RATE: &[KpiQuery] = &[
    KpiQuery {
        id: "4a",
        title: "Overall Failure Rate",
        sql: r#"
            SELECT
                COUNT(*) AS audits,
                COALESCE(SUM(CASE WHEN audit_status = 'FAIL' THEN 1 ELSE 0 END), 0) AS failures,
                ROUND(SUM(CASE WHEN audit_status = 'FAIL' THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 1)
                    AS fail_pct
            FROM audit_results
            WHERE audit_status != 'PENDING'
        "#,
    },
    KpiQuery {
        id: "4b",
        title: "Failure Rate by Module",
        sql: r#"
            SELECT
                a.mid_module,
                COUNT(*) AS audits,
                ROUND(SUM(CASE WHEN ar.audit_status = 'FAIL' THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 1)
                    AS fail_pct
            FROM audit_results ar
            JOIN applications a ON ar.application_id = a.application_id
            WHERE ar.audit_status != 'PENDING'
            GROUP BY a.mid_module
            ORDER BY a.mid_module
        "#,
    },
    KpiQuery {
        id: "4c",
        title: "Top Failure Reasons",
        sql: r#"
            SELECT failure_reason, COUNT(*) AS n
            FROM failures
            GROUP BY failure_reason
            ORDER BY n DESC, failure_reason
            LIMIT 10
        "#,
    },
    KpiQuery {
        id: "4d",
        title: "Module B Failures",
        sql: r#"
            SELECT failure_reason, COUNT(*) AS n
            FROM failures
            WHERE mid_module = 'B'
            GROUP BY failure_reason
            ORDER BY n DESC, failure_reason
            LIMIT 5
        "#,
    },
    KpiQuery {
        id: "4e",
        title: "Module D Failures",
        sql: r#"
            SELECT failure_reason, COUNT(*) AS n
            FROM failures
            WHERE mid_module = 'D'
            GROUP BY failure_reason
            ORDER BY n DESC, failure_reason
            LIMIT 5
        "#,
    },
];

const THROUGHPUT: &[KpiQuery] = &[
    KpiQuery {
        id: "5a",
        title: "Monthly Trend",
        sql: r#"
            SELECT month, certifications, first_time_passes, success_rate
            FROM monthly_throughput
            ORDER BY month
        "#,
    },
    KpiQuery {
        id: "5b",
        title: "Quarterly Summary",
        sql: r#"
            SELECT
                substr(month, 1, 4) || '-Q' ||
                CASE
                    WHEN substr(month, 6, 2) IN ('01', '02', '03') THEN '1'
                    WHEN substr(month, 6, 2) IN ('04', '05', '06') THEN '2'
                    WHEN substr(month, 6, 2) IN ('07', '08', '09') THEN '3'
                    ELSE '4'
                END AS quarter,
                SUM(certifications) AS certs,
                ROUND(AVG(success_rate), 1) AS avg_success
            FROM monthly_throughput
            GROUP BY quarter
            ORDER BY quarter
        "#,
    },
    KpiQuery {
        id: "5c",
        title: "By Instrument Type",
        sql: r#"
            SELECT
                instrument_type,
                COUNT(*) AS certs,
                ROUND(AVG(passed_first_time) * 100, 1) AS success_pct
            FROM application_details
            WHERE certification_date IS NOT NULL
            GROUP BY instrument_type
            ORDER BY certs DESC, instrument_type
        "#,
    },
];

// ============================================================================
// EXECUTION
// ============================================================================

pub async fn run_query(pool: &SqlitePool, kpi: &KpiQuery) -> Result<ReportTable, StoreError> {
    let query_error = |source| StoreError::Query {
        query: kpi.id,
        source,
    };

    let rows = sqlx::query(kpi.sql)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;

    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
        .unwrap_or_default();
    let cells = rows
        .iter()
        .map(decode_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_error)?;

    debug!(kpi = kpi.id, rows = cells.len(), "KPI query finished");
    Ok(ReportTable {
        title: format!("{}. {}", kpi.id, kpi.title),
        columns,
        rows: cells,
    })
}

pub async fn run_family(pool: &SqlitePool, family: KpiFamily) -> Result<Vec<ReportTable>, StoreError> {
    let mut tables = Vec::with_capacity(family.queries().len());
    for kpi in family.queries() {
        tables.push(run_query(pool, kpi).await?);
    }
    Ok(tables)
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Cell>, sqlx::Error> {
    (0..row.len()).map(|i| decode_cell(row, i)).collect()
}

/// Decode by the value's storage class rather than the declared column type
fn decode_cell(row: &SqliteRow, index: usize) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let type_info = raw.type_info();
    let cell = match type_info.name() {
        "INTEGER" | "BOOLEAN" => Cell::Int(row.try_get_unchecked(index)?),
        "REAL" | "NUMERIC" => Cell::Real(row.try_get_unchecked(index)?),
        _ => Cell::Text(row.try_get_unchecked(index)?),
    };
    Ok(cell)
}

// ============================================================================
// TYPED SUMMARIES
// ============================================================================

/// One row of the `module_comparison` view
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ModuleStats {
    pub mid_module: String,
    pub applications: i64,
    pub first_time_passes: i64,
    pub success_rate: f64,
    pub avg_revisions: f64,
    pub avg_days: f64,
}

pub async fn module_comparison(pool: &SqlitePool) -> Result<Vec<ModuleStats>, StoreError> {
    sqlx::query_as::<_, ModuleStats>(
        r#"
        SELECT mid_module, applications, first_time_passes, success_rate, avg_revisions, avg_days
        FROM module_comparison
        ORDER BY mid_module
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|source| StoreError::Query {
        query: "module comparison",
        source,
    })
}

/// Headline figures over completed applications
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutiveSummary {
    pub completed: i64,
    pub first_time_passes: i64,
    pub success_pct: Option<f64>,
    pub avg_revisions: Option<f64>,
    pub avg_days: Option<f64>,
    pub modules: Vec<ModuleStats>,
    pub top_failures: Vec<ReasonCount>,
}

const SUMMARY_TOP_FAILURES: usize = 3;

pub async fn executive_summary(pool: &SqlitePool) -> Result<ExecutiveSummary, StoreError> {
    let (completed, first_time_passes, success_pct, avg_revisions, avg_days): (
        i64,
        i64,
        Option<f64>,
        Option<f64>,
        Option<f64>,
    ) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(passed_first_time), 0),
            ROUND(AVG(passed_first_time) * 100, 1),
            ROUND(AVG(total_revisions), 2),
            ROUND(AVG(turnaround_days), 1)
        FROM application_details
        WHERE certification_date IS NOT NULL
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(|source| StoreError::Query {
        query: "executive summary",
        source,
    })?;

    let mut top_failures = rank_reasons(failure_counts(pool, None).await?);
    top_failures.truncate(SUMMARY_TOP_FAILURES);

    Ok(ExecutiveSummary {
        completed,
        first_time_passes,
        success_pct,
        avg_revisions,
        avg_days,
        modules: module_comparison(pool).await?,
        top_failures,
    })
}

impl fmt::Display for ExecutiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_na = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());

        writeln!(f, "Completed: {} applications", self.completed)?;
        writeln!(f, "Success rate: {}%", or_na(self.success_pct))?;
        writeln!(f, "Avg revisions: {}", or_na(self.avg_revisions))?;
        writeln!(f, "Avg turnaround: {} days", or_na(self.avg_days))?;

        writeln!(f)?;
        writeln!(f, "Module comparison:")?;
        for m in &self.modules {
            writeln!(
                f,
                "  {}: {}% success, {} days",
                m.mid_module, m.success_rate, m.avg_days
            )?;
        }

        writeln!(f)?;
        write!(f, "Top failures:")?;
        for r in &self.top_failures {
            write!(f, "\n  - {} ({})", r.reason, r.count)?;
        }
        Ok(())
    }
}
