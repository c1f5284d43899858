//! SQLite schema: tables, indexes and reporting views
//!
//! Tables are created before the load. Views are created afterwards since
//! nothing reads them during the load.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::StoreError;

/// Table DDL in foreign-key order
pub const TABLES: &[(&str, &str)] = &[
    (
        "clients",
        r#"
        CREATE TABLE clients (
            client_id TEXT PRIMARY KEY
                CHECK (client_id GLOB 'CLI[0-9][0-9][0-9][0-9]'),
            company_name TEXT NOT NULL,
            manufacturer_size TEXT NOT NULL
                CHECK (manufacturer_size IN ('SME', 'Large')),
            sector TEXT NOT NULL
                CHECK (sector IN ('Energy', 'Utilities', 'Retail Fuel', 'Transportation', 'Multi-sector'))
        )
        "#,
    ),
    (
        "applications",
        r#"
        CREATE TABLE applications (
            application_id TEXT PRIMARY KEY
                CHECK (application_id GLOB 'APP[0-9][0-9][0-9][0-9][0-9]'),
            client_id TEXT NOT NULL REFERENCES clients(client_id),
            submission_date TEXT NOT NULL
                CHECK (date(submission_date) = submission_date),
            instrument_type TEXT NOT NULL
                CHECK (instrument_type IN ('Gas Meter', 'Electricity Meter', 'Water Meter', 'Dispenser', 'Taximeter')),
            mid_module TEXT NOT NULL CHECK (mid_module IN ('B', 'D')),
            risk_class TEXT NOT NULL CHECK (risk_class IN ('Low', 'Medium', 'High'))
        )
        "#,
    ),
    (
        "certification_results",
        r#"
        CREATE TABLE certification_results (
            application_id TEXT PRIMARY KEY REFERENCES applications(application_id),
            passed_first_time INTEGER NOT NULL CHECK (passed_first_time IN (0, 1)),
            total_revisions INTEGER NOT NULL CHECK (total_revisions >= 0),
            certification_date TEXT
                CHECK (certification_date IS NULL OR date(certification_date) = certification_date),
            CHECK (passed_first_time = 0 OR total_revisions = 0)
        )
        "#,
    ),
    (
        "audit_results",
        r#"
        CREATE TABLE audit_results (
            audit_id TEXT PRIMARY KEY
                CHECK (audit_id GLOB 'AUD[0-9][0-9][0-9][0-9][0-9]'),
            application_id TEXT NOT NULL REFERENCES applications(application_id),
            audit_date TEXT NOT NULL CHECK (date(audit_date) = audit_date),
            audit_status TEXT NOT NULL CHECK (audit_status IN ('PASS', 'FAIL', 'PENDING')),
            failure_reason TEXT,
            CHECK ((audit_status = 'FAIL') = (failure_reason IS NOT NULL))
        )
        "#,
    ),
];

pub const INDEXES: &[(&str, &str)] = &[
    (
        "idx_app_client",
        "CREATE INDEX idx_app_client ON applications(client_id)",
    ),
    (
        "idx_app_module",
        "CREATE INDEX idx_app_module ON applications(mid_module)",
    ),
    (
        "idx_app_instrument",
        "CREATE INDEX idx_app_instrument ON applications(instrument_type)",
    ),
    (
        "idx_app_date",
        "CREATE INDEX idx_app_date ON applications(submission_date)",
    ),
    (
        "idx_audit_app",
        "CREATE INDEX idx_audit_app ON audit_results(application_id)",
    ),
    (
        "idx_audit_status",
        "CREATE INDEX idx_audit_status ON audit_results(audit_status)",
    ),
    (
        "idx_cert_date",
        "CREATE INDEX idx_cert_date ON certification_results(certification_date)",
    ),
];

pub const VIEWS: &[(&str, &str)] = &[
    (
        "application_details",
        r#"
        CREATE VIEW application_details AS
        SELECT
            a.application_id,
            a.submission_date,
            a.instrument_type,
            a.mid_module,
            a.risk_class,
            c.client_id,
            c.company_name,
            c.manufacturer_size,
            c.sector,
            cr.passed_first_time,
            cr.total_revisions,
            cr.certification_date,
            CAST(julianday(cr.certification_date) - julianday(a.submission_date) AS INTEGER)
                AS turnaround_days
        FROM applications a
        JOIN clients c ON a.client_id = c.client_id
        JOIN certification_results cr ON a.application_id = cr.application_id
        "#,
    ),
    (
        "failures",
        r#"
        CREATE VIEW failures AS
        SELECT
            ar.audit_id,
            ar.application_id,
            ar.audit_date,
            ar.failure_reason,
            a.mid_module,
            a.instrument_type,
            a.risk_class,
            c.manufacturer_size
        FROM audit_results ar
        JOIN applications a ON ar.application_id = a.application_id
        JOIN clients c ON a.client_id = c.client_id
        WHERE ar.audit_status = 'FAIL'
        "#,
    ),
    (
        "monthly_throughput",
        r#"
        CREATE VIEW monthly_throughput AS
        SELECT
            strftime('%Y-%m', certification_date) AS month,
            COUNT(*) AS certifications,
            SUM(passed_first_time) AS first_time_passes,
            ROUND(AVG(passed_first_time) * 100, 1) AS success_rate
        FROM certification_results
        WHERE certification_date IS NOT NULL
        GROUP BY strftime('%Y-%m', certification_date)
        "#,
    ),
    (
        "module_comparison",
        r#"
        CREATE VIEW module_comparison AS
        SELECT
            a.mid_module,
            COUNT(*) AS applications,
            SUM(cr.passed_first_time) AS first_time_passes,
            ROUND(AVG(cr.passed_first_time) * 100, 1) AS success_rate,
            ROUND(AVG(cr.total_revisions), 2) AS avg_revisions,
            ROUND(AVG(julianday(cr.certification_date) - julianday(a.submission_date)), 1)
                AS avg_days
        FROM applications a
        JOIN certification_results cr ON a.application_id = cr.application_id
        WHERE cr.certification_date IS NOT NULL
        GROUP BY a.mid_module
        "#,
    ),
    (
        "client_performance",
        r#"
        CREATE VIEW client_performance AS
        SELECT
            c.client_id,
            c.company_name,
            c.manufacturer_size,
            c.sector,
            COUNT(*) AS applications,
            SUM(cr.passed_first_time) AS first_time_passes,
            ROUND(AVG(cr.passed_first_time) * 100, 1) AS success_rate,
            SUM(cr.total_revisions) AS total_revisions
        FROM clients c
        JOIN applications a ON c.client_id = a.client_id
        JOIN certification_results cr ON a.application_id = cr.application_id
        GROUP BY c.client_id
        "#,
    ),
];

/// Create the four tables and their indexes
pub async fn create_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    for &(object, ddl) in TABLES.iter().chain(INDEXES) {
        execute(pool, object, ddl).await?;
    }
    info!(
        tables = TABLES.len(),
        indexes = INDEXES.len(),
        "Created tables and indexes"
    );
    Ok(())
}

/// Create the reporting views; tables must exist
pub async fn create_views(pool: &SqlitePool) -> Result<(), StoreError> {
    for &(object, ddl) in VIEWS {
        execute(pool, object, ddl).await?;
    }
    info!(views = VIEWS.len(), "Created views");
    Ok(())
}

async fn execute(pool: &SqlitePool, object: &'static str, ddl: &str) -> Result<(), StoreError> {
    sqlx::query(ddl)
        .execute(pool)
        .await
        .map_err(|source| StoreError::Schema { object, source })?;
    Ok(())
}
