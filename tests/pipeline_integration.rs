//! End-to-end pipeline tests
//!
//! The generation and validation stages run without a database. The store
//! tests use an in-memory SQLite database or a file in a temp directory.
//!
//! Run with: cargo test --test pipeline_integration

use mid_cert::config::GenerationConfig;
use mid_cert::dataset::{
    Dataset, APPLICATIONS_FILE, AUDIT_RESULTS_FILE, CERTIFICATION_RESULTS_FILE, CLIENTS_FILE,
};
use mid_cert::pipeline;
use mid_cert::validate::{Severity, Verdict};

fn small_config(seed: u64) -> GenerationConfig {
    GenerationConfig {
        seed,
        num_clients: 12,
        num_applications: 80,
        ..GenerationConfig::default()
    }
}

#[test]
fn test_same_seed_writes_identical_files() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    pipeline::generate(&small_config(7), first.path()).unwrap();
    pipeline::generate(&small_config(7), second.path()).unwrap();

    for file in [
        CLIENTS_FILE,
        APPLICATIONS_FILE,
        CERTIFICATION_RESULTS_FILE,
        AUDIT_RESULTS_FILE,
    ] {
        let a = std::fs::read(first.path().join(file)).unwrap();
        let b = std::fs::read(second.path().join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between runs");
    }
}

#[test]
fn test_generated_data_validates_without_critical_findings() {
    let dir = tempfile::tempdir().unwrap();
    pipeline::generate(&GenerationConfig::default(), dir.path()).unwrap();

    let report = pipeline::validate(dir.path()).unwrap();
    assert_eq!(report.results.len(), 20);
    assert_ne!(report.verdict(), Verdict::Fail, "{report}");
    assert!(report
        .results
        .iter()
        .all(|r| r.severity != Severity::Critical));
}

#[test]
fn test_validate_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(pipeline::validate(&dir.path().join("nowhere")).is_err());
}

#[test]
fn test_generated_dataset_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let written = pipeline::generate(&small_config(3), dir.path()).unwrap();
    let read = Dataset::read_csv(dir.path()).unwrap();
    assert_eq!(written, read);
}

#[cfg(feature = "database")]
mod db_tests {
    use chrono::NaiveDate;

    use mid_cert::analytics::{executive_summary, run_family, KpiFamily};
    use mid_cert::checklist::{build_checklist, estimate_savings, ChecklistScope, Priority};
    use mid_cert::config::GenerationConfig;
    use mid_cert::dataset::Dataset;
    use mid_cert::error::{PipelineError, StoreError};
    use mid_cert::pipeline;
    use mid_cert::store::CertStore;
    use mid_cert::synth::generate_dataset;
    use mid_cert::{
        Application, AuditEvent, AuditStatus, CertificationResult, Client, FailureReason,
        InstrumentType, ManufacturerSize, MidModule, RiskClass, Sector,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One Module D application that failed twice before passing
    fn two_revision_dataset() -> Dataset {
        let audit = |n: u32, day: NaiveDate, reason: Option<FailureReason>| AuditEvent {
            audit_id: format!("AUD{n:05}"),
            application_id: "APP00001".to_string(),
            audit_date: day,
            audit_status: if reason.is_some() {
                AuditStatus::Fail
            } else {
                AuditStatus::Pass
            },
            failure_reason: reason,
        };

        Dataset {
            clients: vec![Client {
                client_id: "CLI0001".to_string(),
                company_name: "Apex Metering Ltd".to_string(),
                manufacturer_size: ManufacturerSize::Sme,
                sector: Sector::Utilities,
            }],
            applications: vec![Application {
                application_id: "APP00001".to_string(),
                client_id: "CLI0001".to_string(),
                submission_date: date(2024, 1, 15),
                instrument_type: InstrumentType::WaterMeter,
                mid_module: MidModule::D,
                risk_class: RiskClass::Medium,
            }],
            certification_results: vec![CertificationResult {
                application_id: "APP00001".to_string(),
                passed_first_time: false,
                total_revisions: 2,
                certification_date: Some(date(2024, 3, 15)),
            }],
            audit_events: vec![
                audit(1, date(2024, 2, 10), Some(FailureReason::TrainingRecordsMissing)),
                audit(2, date(2024, 2, 22), Some(FailureReason::InternalAuditGaps)),
                audit(3, date(2024, 3, 15), None),
            ],
        }
    }

    async fn loaded_store(dataset: &Dataset) -> CertStore {
        let store = CertStore::in_memory().await.unwrap();
        store.materialize(dataset).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_two_revision_case_loads_and_ranks() {
        let store = loaded_store(&two_revision_dataset()).await;

        let counts = store.row_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                ("clients", 1),
                ("applications", 1),
                ("certification_results", 1),
                ("audit_results", 3)
            ]
        );

        let checklist = build_checklist(store.pool(), ChecklistScope::Module(MidModule::D))
            .await
            .unwrap();
        assert_eq!(checklist.total_failures, 2);
        let reasons: Vec<&str> = checklist.items.iter().map(|i| i.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec!["Training records missing", "Internal audit gaps"]
        );
        assert_eq!(checklist.items[0].priority, Priority::High);
        assert_eq!(checklist.items[1].priority, Priority::Low);

        let module_b = build_checklist(store.pool(), ChecklistScope::Module(MidModule::B))
            .await
            .unwrap();
        assert!(module_b.items.is_empty());

        let savings = estimate_savings(store.pool()).await.unwrap();
        assert_eq!(savings.outcomes.total_apps, 1);
        assert_eq!(savings.outcomes.failed_apps, 1);
        assert_eq!(savings.outcomes.total_revisions, 2);
        assert_eq!(savings.failures_prevented, 1);
        assert_eq!(savings.days_saved, 12);

        let summary = executive_summary(store.pool()).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.first_time_passes, 0);
        assert_eq!(summary.avg_days, Some(60.0));

        store.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_client_is_a_constraint_violation() {
        let mut dataset = two_revision_dataset();
        dataset.clients.push(dataset.clients[0].clone());

        let store = CertStore::in_memory().await.unwrap();
        let err = store.materialize(&dataset).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");
        assert!(matches!(err, StoreError::Load { table: "clients", .. }));

        // The failed load leaves nothing behind
        let counts = store.row_counts().await.unwrap();
        assert!(counts.iter().all(|&(_, n)| n == 0), "{counts:?}");
    }

    #[tokio::test]
    async fn test_orphan_application_is_rejected() {
        let mut dataset = two_revision_dataset();
        dataset.applications[0].client_id = "CLI0099".to_string();

        let store = CertStore::in_memory().await.unwrap();
        let err = store.materialize(&dataset).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");
    }

    #[tokio::test]
    async fn test_pass_with_reason_is_rejected() {
        let mut dataset = two_revision_dataset();
        dataset.audit_events[2].failure_reason = Some(FailureReason::InternalAuditGaps);

        let store = CertStore::in_memory().await.unwrap();
        let err = store.materialize(&dataset).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Load {
                table: "audit_results",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_module_checklists_partition_failures() {
        let dataset = generate_dataset(&GenerationConfig::default()).unwrap();
        let store = loaded_store(&dataset).await;

        let all = build_checklist(store.pool(), ChecklistScope::All)
            .await
            .unwrap();
        let mut module_total = 0;
        for module in MidModule::ALL.iter().copied() {
            let checklist = build_checklist(store.pool(), ChecklistScope::Module(module))
                .await
                .unwrap();
            module_total += checklist.total_failures;

            for item in &checklist.items {
                let reason: FailureReason = item.reason.parse().unwrap();
                assert_eq!(reason.module(), module, "{} in module {module}", item.reason);
            }
            if let Some(last) = checklist.items.last() {
                assert!((last.cumulative_pct - 100.0).abs() < 1e-9);
            }
        }
        assert_eq!(all.total_failures, module_total);

        let failed_audits = dataset
            .audit_events
            .iter()
            .filter(|e| e.audit_status == AuditStatus::Fail)
            .count() as i64;
        assert_eq!(all.total_failures, failed_audits);

        // Tiers come in order and cumulative share never decreases
        let priorities: Vec<Priority> = all.items.iter().map(|i| i.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert!(all
            .items
            .windows(2)
            .all(|w| w[0].cumulative_pct <= w[1].cumulative_pct && w[0].count >= w[1].count));

        store.close().await;
    }

    #[tokio::test]
    async fn test_every_kpi_family_runs() {
        let dataset = generate_dataset(&GenerationConfig::default()).unwrap();
        let store = loaded_store(&dataset).await;

        for family in KpiFamily::ALL {
            let tables = run_family(store.pool(), family).await.unwrap();
            assert_eq!(tables.len(), family.queries().len());
            assert!(
                tables.iter().any(|t| !t.rows.is_empty()),
                "{} returned no rows",
                family.title()
            );
        }

        let verification = store.verify().await.unwrap();
        let apps: i64 = verification.modules.iter().map(|m| m.applications).sum();
        let completed = dataset
            .certification_results
            .iter()
            .filter(|r| !r.is_pending())
            .count() as i64;
        assert_eq!(apps, completed);
        assert!(verification.top_failures.len() <= 3);

        store.close().await;
    }

    #[tokio::test]
    async fn test_stages_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("raw");
        let db_path = dir.path().join("out").join("certification.db");
        let export_path = dir.path().join("checklist_items.csv");

        let dataset = pipeline::generate(&GenerationConfig::default(), &data_dir).unwrap();

        let load = pipeline::load(&data_dir, &db_path).await.unwrap();
        assert!(db_path.exists());
        assert_eq!(load.summary.applications, dataset.applications.len() as u64);
        assert_eq!(load.summary.audit_results, dataset.audit_events.len() as u64);

        // Loading again replaces the database rather than appending to it
        let reload = pipeline::load(&data_dir, &db_path).await.unwrap();
        assert_eq!(reload.verification.row_counts, load.verification.row_counts);

        let kpis = pipeline::kpi_report(&db_path).await.unwrap();
        assert_eq!(kpis.families.len(), KpiFamily::ALL.len());
        assert!(kpis.to_string().contains("EXECUTIVE SUMMARY"));

        let checklists = pipeline::checklist_report(&db_path, &export_path)
            .await
            .unwrap();
        assert_eq!(checklists.checklists.len(), 3);
        assert!(checklists.exported_rows > 0);

        let export = std::fs::read_to_string(&export_path).unwrap();
        let mut lines = export.lines();
        assert_eq!(
            lines.next(),
            Some("failure_reason,module,occurrence_count,percentage_of_total,remediation_text")
        );
        assert_eq!(lines.count(), checklists.exported_rows);
    }

    #[tokio::test]
    async fn test_reporting_without_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("missing.db");

        let err = pipeline::kpi_report(&db_path).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Store(StoreError::MissingDatabase(_))
        ));
        assert!(!db_path.exists());
    }
}
