//! MID certification pipeline CLI
//!
//! # Usage
//!
//! ```bash
//! # Generate the synthetic dataset into data/raw
//! mid_cert generate --seed 42
//!
//! # Data-quality checks (exit status 1 on a FAIL verdict)
//! mid_cert validate
//!
//! # Load into SQLite, then report
//! mid_cert load
//! mid_cert report
//! mid_cert checklist
//!
//! # Everything in order, stopping on a FAIL verdict
//! mid_cert run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use mid_cert::config::PipelineConfig;
use mid_cert::dataset::DatasetStats;
use mid_cert::pipeline;
use mid_cert::validate::{ValidationReport, Verdict};

#[derive(Parser)]
#[command(name = "mid_cert")]
#[command(version)]
#[command(about = "Synthetic MID certification history: generate, validate, load and report")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(long, short, global = true, env = "MID_CERT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the generated CSV files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Checklist CSV export destination
    #[arg(long, global = true)]
    checklist_path: Option<PathBuf>,

    /// Random seed for generation
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Number of clients to generate
    #[arg(long, global = true)]
    clients: Option<u32>,

    /// Number of applications to generate
    #[arg(long, global = true)]
    applications: Option<u32>,

    /// Log progress (info level unless RUST_LOG says otherwise)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the four CSV files
    Generate,

    /// Run the data-quality checks over the CSV files
    Validate,

    /// Recreate the database from the CSV files
    Load,

    /// Print the KPI report
    Report,

    /// Print the pre-audit checklists and export them as CSV
    Checklist,

    /// Run every stage in order
    Run {
        /// Continue past a FAIL validation verdict
        #[arg(long)]
        force: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Generate => cmd_generate(&config),
        Commands::Validate => cmd_validate(&config),
        Commands::Load => cmd_load(&config).await,
        Commands::Report => cmd_report(&config).await,
        Commands::Checklist => cmd_checklist(&config).await,
        Commands::Run { force } => cmd_run(&config, force).await,
    }
}

/// Defaults, then file, then environment, then flags
fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    if let Some(db) = &cli.db_path {
        config.paths.db_path = db.clone();
    }
    if let Some(path) = &cli.checklist_path {
        config.paths.checklist_path = path.clone();
    }
    if let Some(seed) = cli.seed {
        config.generation.seed = seed;
    }
    if let Some(clients) = cli.clients {
        config.generation.num_clients = clients;
    }
    if let Some(applications) = cli.applications {
        config.generation.num_applications = applications;
    }
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_generate(config: &PipelineConfig) -> Result<ExitCode> {
    let dataset = pipeline::generate(&config.generation, &config.paths.data_dir)
        .context("generating dataset")?;
    print_stats(&dataset.stats());
    println!(
        "{} Wrote dataset to {}",
        "OK".green(),
        config.paths.data_dir.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn print_stats(stats: &DatasetStats) {
    println!("Clients:            {}", stats.clients);
    println!("Applications:       {}", stats.applications);
    println!("Audit events:       {}", stats.audit_events);
    println!("Failed audits:      {}", stats.failed_audits);
    println!("Pending:            {}", stats.pending);
    println!("First-time pass:    {:.1}%", stats.first_time_pass_pct);
}

fn cmd_validate(config: &PipelineConfig) -> Result<ExitCode> {
    let report = validate_stage(config)?;
    Ok(if report.verdict() == Verdict::Fail {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn validate_stage(config: &PipelineConfig) -> Result<ValidationReport> {
    let report = pipeline::validate(&config.paths.data_dir).context("validating dataset")?;
    println!("{report}");
    let verdict = report.verdict();
    let label = match verdict {
        Verdict::Pass => verdict.as_str().green().bold(),
        Verdict::PassWithWarnings => verdict.as_str().yellow().bold(),
        Verdict::Fail => verdict.as_str().red().bold(),
    };
    println!("\nValidation verdict: {label}");
    Ok(report)
}

async fn cmd_load(config: &PipelineConfig) -> Result<ExitCode> {
    let report = pipeline::load(&config.paths.data_dir, &config.paths.db_path)
        .await
        .context("loading database")?;
    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_report(config: &PipelineConfig) -> Result<ExitCode> {
    let report = pipeline::kpi_report(&config.paths.db_path)
        .await
        .context("building KPI report")?;
    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_checklist(config: &PipelineConfig) -> Result<ExitCode> {
    let report = pipeline::checklist_report(&config.paths.db_path, &config.paths.checklist_path)
        .await
        .context("building checklist")?;
    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(config: &PipelineConfig, force: bool) -> Result<ExitCode> {
    println!("{}", "[1/5] generate".cyan().bold());
    cmd_generate(config)?;

    println!("\n{}", "[2/5] validate".cyan().bold());
    let report = validate_stage(config)?;
    if report.verdict() == Verdict::Fail {
        if !force {
            eprintln!(
                "{}: validation failed; rerun with --force to continue",
                "stopped".red().bold()
            );
            return Ok(ExitCode::FAILURE);
        }
        eprintln!("{}: continuing past FAIL verdict", "warning".yellow().bold());
    }

    println!("\n{}", "[3/5] load".cyan().bold());
    cmd_load(config).await?;

    println!("\n{}", "[4/5] report".cyan().bold());
    cmd_report(config).await?;

    println!("\n{}", "[5/5] checklist".cyan().bold());
    cmd_checklist(config).await
}
