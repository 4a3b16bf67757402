//! HMPI CLI - heavy metal pollution index assessment for water-quality monitoring

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Reports go to stdout, diagnostics and logs go to stderr

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use hmpi_core::aggregates::{self, GroupBy};
use hmpi_core::alert;
use hmpi_core::compliance;
use hmpi_core::config;
use hmpi_core::ingest::{Dataset, IngestMode};
use hmpi_core::report;
use hmpi_core::trends;
use hmpi_core::{
    load_monitoring_data, MemoryRepository, MonitoringData, Rejection, ResolvedConfig,
    SampleFilter, SampleRepository, SqliteRepository,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "hmpi")]
#[command(about = "Heavy metal pollution index assessment for water-quality monitoring")]
#[command(version)]
struct Cli {
    /// Dataset JSON file
    #[arg(long, global = true, conflicts_with = "db")]
    data: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Only samples of this project id
    #[arg(long)]
    project: Option<String>,

    /// Only samples of this metal
    #[arg(long)]
    metal: Option<String>,

    /// Only samples from this district
    #[arg(long)]
    district: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> SampleFilter {
        SampleFilter {
            project_id: self.project.clone(),
            metal: self.metal.clone(),
            district: self.district.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute HMPI and risk level for every sample
    Assess {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Show only top N rows (overrides config file)
        #[arg(long)]
        top: Option<usize>,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Evaluate alert conditions
    Alerts {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Store new alerts in the repository
        #[arg(long)]
        persist: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Acknowledge a stored alert
    Ack {
        /// Alert id
        id: String,
    },
    /// Compare groups of samples
    Compare {
        /// Grouping dimension
        #[arg(long, default_value = "project")]
        by: GroupByArg,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Monthly index trend
    Trends {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Compliance with WHO, BBI and policy limits
    Compliance {
        /// Proposed project HMPI threshold to evaluate
        #[arg(long)]
        threshold: Option<f64>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Overview of projects, samples and open alerts
    Dashboard {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Import a dataset JSON file into the database given by --db
    Import {
        /// Dataset JSON file
        dataset: PathBuf,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum GroupByArg {
    Project,
    Metal,
    District,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::Project => GroupBy::Project,
            GroupByArg::Metal => GroupBy::Metal,
            GroupByArg::District => GroupBy::District,
        }
    }
}

/// The repository selected by --data or --db
enum Store {
    Memory { repo: MemoryRepository, path: PathBuf },
    Sqlite(SqliteRepository),
}

impl Store {
    /// Only `import` may create a database; every other command needs an existing one
    fn open(data: Option<&Path>, db: Option<&Path>) -> anyhow::Result<Self> {
        match (data, db) {
            (_, Some(db)) => Ok(Store::Sqlite(SqliteRepository::open_existing(db)?)),
            (Some(data), None) => Ok(Store::Memory {
                repo: MemoryRepository::load(data)?,
                path: data.to_path_buf(),
            }),
            (None, None) => {
                anyhow::bail!("no data source: pass --data <dataset.json> or --db <file.sqlite>")
            }
        }
    }

    fn repo(&self) -> &dyn SampleRepository {
        match self {
            Store::Memory { repo, .. } => repo,
            Store::Sqlite(repo) => repo,
        }
    }

    fn repo_mut(&mut self) -> &mut dyn SampleRepository {
        match self {
            Store::Memory { repo, .. } => repo,
            Store::Sqlite(repo) => repo,
        }
    }

    /// Write in-memory changes back to the dataset file
    fn save(self) -> anyhow::Result<()> {
        match self {
            Store::Memory { repo, path } => {
                let json = repo.into_dataset().to_json()?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write dataset: {}", path.display()))
            }
            Store::Sqlite(_) => Ok(()),
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hmpi=info,hmpi_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn report_rejections(data: &MonitoringData) {
    let rejected: Vec<&Rejection> = data
        .ingest_rejected
        .iter()
        .chain(&data.assessment.rejected)
        .collect();
    if !rejected.is_empty() {
        eprintln!("Skipped {} invalid sample(s):", rejected.len());
        for r in rejected {
            eprintln!("  {}: {}", r.sample_id, r.reason);
        }
    }
}

fn load(
    cli_data: Option<&Path>,
    cli_db: Option<&Path>,
    resolved: &ResolvedConfig,
    filter: &FilterArgs,
) -> anyhow::Result<(Store, MonitoringData)> {
    let store = Store::open(cli_data, cli_db)?;
    let data = load_monitoring_data(store.repo(), &filter.to_filter(), resolved)?;
    report_rejections(&data);
    Ok((store, data))
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let data_path = cli.data.as_deref();
    let db_path = cli.db.as_deref();
    let resolve = || {
        config::load_and_resolve(&cwd, cli.config.as_deref())
            .context("failed to load configuration")
    };

    match cli.command {
        Commands::Assess {
            format,
            top,
            filter,
        } => {
            let resolved = resolve()?;
            let (_, data) = load(data_path, db_path, &resolved, &filter)?;
            let rows = report::build_rows(&data.assessment.assessed, &data.projects, &data.standards);
            match format {
                OutputFormat::Text => {
                    print!("{}", report::render_text(&rows, top.or(resolved.top_n)));
                    let stats = report::calculation_stats(&rows, &data.assessment.assessed);
                    println!();
                    println!(
                        "Samples: {}  Average HMPI: {:.1}  High risk: {}  Exceeds WHO: {}  Exceeds BBI: {}  Exceeds policy: {}",
                        stats.total_samples,
                        stats.average_index,
                        stats.high_risk,
                        stats.exceeds_who,
                        stats.exceeds_bbi,
                        stats.exceeds_policy
                    );
                }
                OutputFormat::Json => println!("{}", report::render_json(&rows)?),
                OutputFormat::Csv => print!("{}", report::render_csv(&rows)),
            }
        }
        Commands::Alerts {
            format,
            persist,
            filter,
        } => {
            let resolved = resolve()?;
            let (mut store, data) = load(data_path, db_path, &resolved, &filter)?;
            let evaluation = alert::evaluate_all(
                &data.samples(),
                &data.projects,
                &data.standards,
                &resolved.alert_options(),
            );
            for rejection in &evaluation.rejected {
                eprintln!("  {}: {}", rejection.sample_id, rejection.reason);
            }

            match format {
                OutputFormat::Json => println!("{}", report::render_json(&evaluation.alerts)?),
                _ => print!("{}", report::render_alerts_text(&evaluation.alerts)),
            }

            if persist {
                let now = Utc::now();
                let mut inserted = 0;
                for draft in evaluation.alerts {
                    let id = draft.default_id();
                    if store.repo_mut().insert_alert(&draft.into_alert(id, now))? {
                        inserted += 1;
                    }
                }
                store.save()?;
                tracing::info!(inserted, "persisted alerts");
                eprintln!("Stored {} new alert(s)", inserted);
            }
        }
        Commands::Ack { id } => {
            let mut store = Store::open(data_path, db_path)?;
            if !store.repo_mut().acknowledge_alert(&id)? {
                anyhow::bail!("no alert with id '{}'", id);
            }
            store.save()?;
            println!("Acknowledged alert {}", id);
        }
        Commands::Compare {
            by,
            format,
            filter,
        } => {
            let resolved = resolve()?;
            let (_, data) = load(data_path, db_path, &resolved, &filter)?;
            let assessed = &data.assessment.assessed;

            match GroupBy::from(by) {
                GroupBy::Metal => {
                    let stats = aggregates::compare_metals(assessed, &data.standards);
                    match format {
                        OutputFormat::Json => println!("{}", report::render_json(&stats)?),
                        _ => print!("{}", report::render_metal_text(&stats)),
                    }
                }
                group_by => {
                    let stats = aggregates::compare_by(assessed, group_by);
                    match format {
                        OutputFormat::Json => println!("{}", report::render_json(&stats)?),
                        _ => {
                            print!("{}", report::render_comparison_text(&stats));
                            if let (Some(best), Some(worst)) =
                                (aggregates::best_group(&stats), aggregates::worst_group(&stats))
                            {
                                println!();
                                println!("Best:  {} ({:.2})", best.key, best.average_index);
                                println!("Worst: {} ({:.2})", worst.key, worst.average_index);
                            }
                        }
                    }
                }
            }
        }
        Commands::Trends { format, filter } => {
            let resolved = resolve()?;
            let (_, data) = load(data_path, db_path, &resolved, &filter)?;
            let stats = trends::trend_stats(&data.assessment.assessed);
            match format {
                OutputFormat::Json => println!("{}", stats.to_json()?),
                _ => print!("{}", report::render_trends_text(&stats)),
            }
        }
        Commands::Compliance {
            threshold,
            format,
            filter,
        } => {
            let resolved = resolve()?;
            let (_, data) = load(data_path, db_path, &resolved, &filter)?;
            let assessed = &data.assessment.assessed;
            let compliance_report = report::ComplianceReport {
                summary: compliance::compliance_summary(assessed, &data.standards, &data.projects),
                policies: compliance::policy_tallies(&data.samples(), &data.policies),
                threshold_impact: threshold.map(|t| compliance::threshold_impact(assessed, t)),
            };

            match format {
                OutputFormat::Json => println!("{}", report::render_json(&compliance_report)?),
                _ => print!("{}", report::render_compliance_text(&compliance_report)),
            }
        }
        Commands::Dashboard { format } => {
            let resolved = resolve()?;
            let (_, data) = load(data_path, db_path, &resolved, &FilterArgs::default())?;
            let assessed = &data.assessment.assessed;
            let dashboard = report::DashboardReport {
                summary: aggregates::dashboard_summary(&data.projects, assessed, &data.alerts),
                risk_distribution: aggregates::risk_distribution(assessed),
            };

            match format {
                OutputFormat::Json => println!("{}", report::render_json(&dashboard)?),
                _ => print!("{}", report::render_dashboard_text(&dashboard)),
            }
        }
        Commands::Import { dataset } => {
            let db = db_path.context("import requires --db <file.sqlite>")?;
            let dataset = Dataset::load(&dataset)?;
            let mut repo = SqliteRepository::open(db)?;
            let summary = repo.import_dataset(&dataset)?;
            println!(
                "Imported {} project(s), {} sample(s), {} policy(ies), {} alert(s), {} standard limit(s) into {}",
                summary.projects,
                summary.samples,
                summary.policies,
                summary.alerts,
                summary.standards,
                db.display()
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let path = path.or_else(|| cli.config.clone());
                let resolved = config::load_and_resolve(&cwd, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let path = path.or_else(|| cli.config.clone());
                let resolved = config::load_and_resolve(&cwd, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Risk thresholds:");
    println!("  low: {}", resolved.risk_thresholds.low);
    println!("  moderate: {}", resolved.risk_thresholds.moderate);
    println!("  high: {}", resolved.risk_thresholds.high);
    println!("  very_high: {}", resolved.risk_thresholds.very_high);
    println!();
    println!("Alerts:");
    println!(
        "  caution_index: {}",
        resolved
            .caution_index
            .map(|v| v.to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );
    println!();
    println!("Standards (mg/L):");
    for (label, table) in [("WHO", &resolved.standards.who), ("BBI", &resolved.standards.bbi)] {
        let limits: Vec<String> = table
            .iter()
            .map(|(metal, limit)| format!("{}={}", metal, limit))
            .collect();
        println!("  {}: {}", label, limits.join(", "));
    }
    println!();
    println!("Ingestion:");
    println!(
        "  mode: {}",
        match resolved.ingest_mode {
            IngestMode::Lenient => "lenient",
            IngestMode::Strict => "strict",
        }
    );
    println!(
        "  top: {}",
        resolved
            .top_n
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
}
