//! Pipeline stages
//!
//! generate -> validate -> load -> report / checklist. Each stage reads the
//! previous stage's output from disk, so any stage can be re-run on its own.

use std::path::Path;

use tracing::info;

use crate::config::GenerationConfig;
use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::synth::generate_dataset;
use crate::validate::{validate_dir, ValidationReport};

/// Generate the dataset and write it to `data_dir`
pub fn generate(config: &GenerationConfig, data_dir: &Path) -> Result<Dataset, PipelineError> {
    info!(
        seed = config.seed,
        clients = config.num_clients,
        applications = config.num_applications,
        "Generating dataset"
    );
    let dataset = generate_dataset(config)?;
    dataset.write_csv(data_dir)?;
    Ok(dataset)
}

/// Run all data-quality checks over the CSV files in `data_dir`
pub fn validate(data_dir: &Path) -> Result<ValidationReport, PipelineError> {
    Ok(validate_dir(data_dir)?)
}

#[cfg(feature = "database")]
pub use database::*;

#[cfg(feature = "database")]
mod database {
    use std::fmt;
    use std::path::{Path, PathBuf};

    use tracing::info;

    use crate::analytics::{executive_summary, run_family, ExecutiveSummary, KpiFamily, ReportTable};
    use crate::checklist::{
        analyze_failures, build_checklist, estimate_savings, impact_analysis, load_export_rows,
        write_export, Checklist, ChecklistScope, FailureAnalysis, ImpactAnalysis, SavingsEstimate,
    };
    use crate::dataset::Dataset;
    use crate::error::{PipelineError, StoreError};
    use crate::report::{banner, render_table, section};
    use crate::store::{CertStore, LoadSummary, Verification};

    const REPORT_WIDTH: usize = 60;

    /// Outcome of the load stage
    #[derive(Debug, Clone, PartialEq)]
    pub struct LoadReport {
        pub db_path: PathBuf,
        pub summary: LoadSummary,
        pub verification: Verification,
    }

    impl fmt::Display for LoadReport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "Database: {}", self.db_path.display())?;
            for (table, rows) in &self.verification.row_counts {
                writeln!(f, "  {table}: {rows} rows")?;
            }
            writeln!(f)?;
            writeln!(f, "Verification:")?;
            for m in &self.verification.modules {
                writeln!(
                    f,
                    "  Module {}: {} apps, {}% pass rate, {} days avg",
                    m.mid_module, m.applications, m.success_rate, m.avg_days
                )?;
            }
            let top: Vec<&str> = self
                .verification
                .top_failures
                .iter()
                .map(|r| r.reason.as_str())
                .collect();
            write!(f, "  Top failures: {}", top.join(", "))
        }
    }

    /// Load the CSV files in `data_dir` into a fresh database at `db_path`
    pub async fn load(data_dir: &Path, db_path: &Path) -> Result<LoadReport, PipelineError> {
        let dataset = Dataset::read_csv(data_dir)?;
        let store = CertStore::create(db_path).await?;
        let result = materialize(&store, &dataset).await;
        store.close().await;

        let (summary, verification) = result?;
        info!(db = %db_path.display(), rows = summary.total(), "Load complete");
        Ok(LoadReport {
            db_path: db_path.to_path_buf(),
            summary,
            verification,
        })
    }

    async fn materialize(
        store: &CertStore,
        dataset: &Dataset,
    ) -> Result<(LoadSummary, Verification), StoreError> {
        let summary = store.materialize(dataset).await?;
        let verification = store.verify().await?;
        Ok((summary, verification))
    }

    /// All KPI families plus the executive summary
    #[derive(Debug, Clone, PartialEq)]
    pub struct KpiReport {
        pub families: Vec<(KpiFamily, Vec<ReportTable>)>,
        pub summary: ExecutiveSummary,
    }

    impl fmt::Display for KpiReport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (family, tables) in &self.families {
                writeln!(f, "{}", banner(family.title(), REPORT_WIDTH))?;
                for table in tables {
                    write!(f, "\n{}\n{}\n", section(&table.title), render_table(table))?;
                }
                writeln!(f)?;
            }
            write!(f, "{}\n{}", section("EXECUTIVE SUMMARY"), self.summary)
        }
    }

    pub async fn kpi_report(db_path: &Path) -> Result<KpiReport, PipelineError> {
        let store = CertStore::open(db_path).await?;
        let result = collect_kpis(&store).await;
        store.close().await;
        Ok(result?)
    }

    async fn collect_kpis(store: &CertStore) -> Result<KpiReport, StoreError> {
        let mut families = Vec::with_capacity(KpiFamily::ALL.len());
        for family in KpiFamily::ALL {
            families.push((family, run_family(store.pool(), family).await?));
        }
        let summary = executive_summary(store.pool()).await?;
        info!(families = families.len(), "KPI report ready");
        Ok(KpiReport { families, summary })
    }

    /// Failure analysis, checklists, projection and export location
    #[derive(Debug, Clone, PartialEq)]
    pub struct ChecklistReport {
        pub failures: FailureAnalysis,
        pub impact: ImpactAnalysis,
        pub checklists: Vec<Checklist>,
        pub savings: SavingsEstimate,
        pub export_path: PathBuf,
        pub exported_rows: usize,
    }

    impl fmt::Display for ChecklistReport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}\n\n{}\n\n", section("Failure Analysis"), self.failures)?;
            write!(f, "{}\n\n{}\n", section("Impact Analysis"), self.impact)?;
            for checklist in &self.checklists {
                write!(f, "\n{checklist}\n")?;
            }
            write!(f, "\n{}\n", self.savings)?;
            write!(
                f,
                "\nExported: {} ({} rows)",
                self.export_path.display(),
                self.exported_rows
            )
        }
    }

    /// Build the checklists from `db_path` and write the CSV export
    pub async fn checklist_report(
        db_path: &Path,
        export_path: &Path,
    ) -> Result<ChecklistReport, PipelineError> {
        let store = CertStore::open(db_path).await?;
        let result = collect_checklists(&store).await;
        store.close().await;

        let (failures, impact, checklists, savings, rows) = result?;
        write_export(export_path, &rows)?;
        info!(path = %export_path.display(), rows = rows.len(), "Exported checklist");

        Ok(ChecklistReport {
            failures,
            impact,
            checklists,
            savings,
            export_path: export_path.to_path_buf(),
            exported_rows: rows.len(),
        })
    }

    type ChecklistParts = (
        FailureAnalysis,
        ImpactAnalysis,
        Vec<Checklist>,
        SavingsEstimate,
        Vec<crate::checklist::ExportRow>,
    );

    async fn collect_checklists(store: &CertStore) -> Result<ChecklistParts, StoreError> {
        let pool = store.pool();
        let failures = analyze_failures(pool).await?;
        let impact = impact_analysis(pool).await?;
        let mut checklists = Vec::with_capacity(ChecklistScope::ALL.len());
        for scope in ChecklistScope::ALL {
            checklists.push(build_checklist(pool, scope).await?);
        }
        let savings = estimate_savings(pool).await?;
        let rows = load_export_rows(pool).await?;
        Ok((failures, impact, checklists, savings, rows))
    }
}
