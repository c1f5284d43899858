//! Bulk load of a [`Dataset`] into the four tables
//!
//! Everything is inserted inside one transaction in foreign-key order. The
//! first rejected row aborts the load and rolls the transaction back.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::dataset::Dataset;
use crate::error::StoreError;

/// Rows inserted per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub clients: u64,
    pub applications: u64,
    pub certification_results: u64,
    pub audit_results: u64,
}

impl LoadSummary {
    pub fn total(&self) -> u64 {
        self.clients + self.applications + self.certification_results + self.audit_results
    }
}

pub async fn load_dataset(pool: &SqlitePool, dataset: &Dataset) -> Result<LoadSummary, StoreError> {
    let mut tx = pool.begin().await.map_err(StoreError::Transaction)?;

    // Dropping `tx` on an early return rolls the transaction back.
    let summary = LoadSummary {
        clients: insert_clients(&mut tx, dataset).await?,
        applications: insert_applications(&mut tx, dataset).await?,
        certification_results: insert_certification_results(&mut tx, dataset).await?,
        audit_results: insert_audit_results(&mut tx, dataset).await?,
    };

    tx.commit().await.map_err(StoreError::Transaction)?;

    info!(
        clients = summary.clients,
        applications = summary.applications,
        certification_results = summary.certification_results,
        audit_results = summary.audit_results,
        "Loaded dataset"
    );
    Ok(summary)
}

async fn insert_clients(
    tx: &mut Transaction<'_, Sqlite>,
    dataset: &Dataset,
) -> Result<u64, StoreError> {
    let mut rows = 0;
    for client in &dataset.clients {
        rows += sqlx::query(
            r#"
            INSERT INTO clients (client_id, company_name, manufacturer_size, sector)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.company_name)
        .bind(client.manufacturer_size.as_str())
        .bind(client.sector.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|source| StoreError::Load {
            table: "clients",
            key: client.client_id.clone(),
            source,
        })?
        .rows_affected();
    }
    Ok(rows)
}

async fn insert_applications(
    tx: &mut Transaction<'_, Sqlite>,
    dataset: &Dataset,
) -> Result<u64, StoreError> {
    let mut rows = 0;
    for app in &dataset.applications {
        rows += sqlx::query(
            r#"
            INSERT INTO applications
                (application_id, client_id, submission_date, instrument_type, mid_module, risk_class)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&app.application_id)
        .bind(&app.client_id)
        .bind(app.submission_date.to_string())
        .bind(app.instrument_type.as_str())
        .bind(app.mid_module.as_str())
        .bind(app.risk_class.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|source| StoreError::Load {
            table: "applications",
            key: app.application_id.clone(),
            source,
        })?
        .rows_affected();
    }
    Ok(rows)
}

async fn insert_certification_results(
    tx: &mut Transaction<'_, Sqlite>,
    dataset: &Dataset,
) -> Result<u64, StoreError> {
    let mut rows = 0;
    for result in &dataset.certification_results {
        rows += sqlx::query(
            r#"
            INSERT INTO certification_results
                (application_id, passed_first_time, total_revisions, certification_date)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&result.application_id)
        .bind(i64::from(result.passed_first_time))
        .bind(i64::from(result.total_revisions))
        .bind(result.certification_date.map(|d| d.to_string()))
        .execute(&mut **tx)
        .await
        .map_err(|source| StoreError::Load {
            table: "certification_results",
            key: result.application_id.clone(),
            source,
        })?
        .rows_affected();
    }
    Ok(rows)
}

async fn insert_audit_results(
    tx: &mut Transaction<'_, Sqlite>,
    dataset: &Dataset,
) -> Result<u64, StoreError> {
    let mut rows = 0;
    for event in &dataset.audit_events {
        rows += sqlx::query(
            r#"
            INSERT INTO audit_results
                (audit_id, application_id, audit_date, audit_status, failure_reason)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&event.audit_id)
        .bind(&event.application_id)
        .bind(event.audit_date.to_string())
        .bind(event.audit_status.as_str())
        .bind(event.failure_reason.map(|r| r.as_str()))
        .execute(&mut **tx)
        .await
        .map_err(|source| StoreError::Load {
            table: "audit_results",
            key: event.audit_id.clone(),
            source,
        })?
        .rows_affected();
    }
    Ok(rows)
}
