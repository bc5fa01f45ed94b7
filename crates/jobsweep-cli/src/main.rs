mod feed;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobsweep_core::orchestrator::{CycleOutcome, CycleReport, Orchestrator};
use jobsweep_core::store::SnapshotStore;
use jobsweep_core::{JsonFileStore, OrchestratorConfig};

use crate::feed::JsonFeedAdapter;

#[derive(Parser)]
#[command(name = "jobsweep", version, about = "Rate-governed job posting scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scrape cycles against all enabled sources
    Run {
        /// Path to the JSON configuration file listing sources
        #[arg(short, long, env = "JOBSWEEP_CONFIG", default_value = "jobsweep.json")]
        config: PathBuf,

        /// Path to the dataset file
        #[arg(short, long, env = "JOBSWEEP_DATA", default_value = "data/jobs.json")]
        data: PathBuf,

        /// Repeat the cycle every N seconds instead of running once
        #[arg(long)]
        every: Option<u64>,
    },

    /// Show the freshest records in the dataset
    Latest {
        /// Path to the dataset file
        #[arg(short, long, env = "JOBSWEEP_DATA", default_value = "data/jobs.json")]
        data: PathBuf,

        /// Number of records to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Only show records from this source
        #[arg(short, long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobsweep=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            every,
        } => cmd_run(&config, &data, every).await?,
        Commands::Latest {
            data,
            limit,
            source,
        } => cmd_latest(&data, limit, source.as_deref())?,
    }

    Ok(())
}

async fn cmd_run(config_path: &PathBuf, data_path: &PathBuf, every: Option<u64>) -> Result<()> {
    let config = OrchestratorConfig::from_json_file(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Some(dir) = data_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
    }
    let store = JsonFileStore::open(data_path)
        .with_context(|| format!("opening dataset at {}", data_path.display()))?;

    let orchestrator = Orchestrator::new(JsonFeedAdapter, store, config);

    match every {
        None => {
            let report = orchestrator.run_cycle().await?;
            print_report(&report);
        }
        Some(secs) => {
            // The core holds no timers; this loop is the scheduling trigger.
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match orchestrator.run_cycle().await {
                    Ok(report) => print_report(&report),
                    // A commit failure leaves the previous dataset
                    // authoritative; keep trying on the next tick.
                    Err(e) => tracing::error!(error = %e, "Cycle aborted"),
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &CycleReport) {
    let outcome = match report.outcome {
        CycleOutcome::FullSuccess => "full success",
        CycleOutcome::PartialSuccess => "partial success",
        CycleOutcome::FullFailure => "full failure",
    };
    println!(
        "cycle {} — {} ({} records total)",
        report.run_id, outcome, report.total_records
    );
    for source in &report.sources {
        match &source.error {
            None => println!(
                "  {:<20} ok: {} records in {} attempt(s)",
                source.source_id, source.records, source.attempts
            ),
            Some(error) => println!(
                "  {:<20} FAILED after {} attempt(s): {}",
                source.source_id, source.attempts, error
            ),
        }
    }
}

fn cmd_latest(data_path: &PathBuf, limit: usize, source: Option<&str>) -> Result<()> {
    let store = JsonFileStore::open(data_path)
        .with_context(|| format!("opening dataset at {}", data_path.display()))?;
    let snapshot = store.read();

    println!(
        "dataset generated at {} — {} records",
        snapshot.generated_at,
        snapshot.len()
    );
    // The snapshot is already sorted freshest-first.
    let shown = snapshot
        .records
        .iter()
        .filter(|r| source.is_none_or(|s| r.source == s))
        .take(limit);
    for record in shown {
        println!(
            "[{}] {} — {} ({})\n    {}",
            record.scraped_at.format("%Y-%m-%d %H:%M"),
            record.title,
            record.source,
            record.location,
            record.url
        );
    }

    Ok(())
}
