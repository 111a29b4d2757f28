//! Flightdeck daemon - release health aggregation engine.
//!
//! Ingests pre-aggregated release telemetry, stores it as a durable
//! time series, and serves per-version health-rate summaries and
//! realignable series. Subcommands cover the one-shot entry points the
//! external scheduler (or an operator) drives.

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flightdeckd::buildhub;
use flightdeckd::config::{Config, CONFIG_PATH};
use flightdeckd::engine::Engine;
use flightdeckd::experiment;
use flightdeckd::ingest::IngestOptions;
use flightdeckd::service::{
    self, CatalogSummaryParams, ExperimentDataParams, MeasureDataParams, SummaryParams,
};

#[derive(Parser)]
#[command(name = "flightdeckd")]
#[command(about = "Release health aggregation engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the current window for one dimension combination
    Ingest {
        #[arg(long, default_value = "firefox")]
        application: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        channel: String,

        /// Explicit submission date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Insert row-at-a-time, skipping duplicates (for windows that
        /// may overlap already-ingested data)
        #[arg(long)]
        safe: bool,
    },

    /// Ingest every configured dimension combination in parallel
    IngestAll {
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        safe: bool,
    },

    /// Backfill a date range for one dimension combination (safe mode)
    Backfill {
        #[arg(long, default_value = "firefox")]
        application: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        channel: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,
    },

    /// Sync the released-build registry from the build metadata service
    SyncBuilds,

    /// Ingest branch data for an experiment
    IngestExperiment {
        #[arg(long)]
        experiment: String,
    },

    /// Print a dimension's measure summary as JSON
    Summary {
        #[arg(long, default_value = "firefox")]
        application: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        channel: String,

        #[arg(long)]
        measure: String,
    },

    /// Print measure data as JSON (absolute or relative mode)
    Data {
        #[arg(long, default_value = "firefox")]
        application: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        channel: String,

        #[arg(long)]
        measure: String,

        /// Window length in seconds (0 in relative mode derives the
        /// anchor version's span)
        #[arg(long)]
        interval: i64,

        /// Window start (absolute mode) or starting offset (relative)
        #[arg(long)]
        start: Option<i64>,

        #[arg(long)]
        relative: bool,

        /// Target versions for relative mode (repeatable)
        #[arg(long = "version")]
        versions: Vec<String>,
    },

    /// Print branch-keyed experiment data as JSON
    ExperimentData {
        #[arg(long)]
        experiment: String,

        #[arg(long)]
        measure: String,

        /// Window length in seconds
        #[arg(long)]
        interval: i64,

        #[arg(long)]
        start: Option<i64>,
    },

    /// Print the catalog summary as JSON
    Catalog {
        #[arg(long)]
        platform: Option<String>,

        #[arg(long)]
        channel: Option<String>,
    },

    /// Delete samples past the retention horizon
    Expire,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let engine = Engine::new(config)?;

    match cli.command {
        Commands::Ingest {
            application,
            platform,
            channel,
            date,
            safe,
        } => {
            let report = engine
                .refresh_dimension(
                    &application,
                    &platform,
                    &channel,
                    IngestOptions {
                        submission_date: date,
                        bulk: !safe,
                    },
                )
                .await?;
            info!(
                "Ingest complete: {} inserted, {} rows fetched",
                report.inserted, report.fetched_rows
            );
        }
        Commands::IngestAll { date, safe } => {
            let succeeded = engine
                .refresh_all(IngestOptions {
                    submission_date: date,
                    bulk: !safe,
                })
                .await?;
            info!("Refreshed {} dimension combinations", succeeded);
        }
        Commands::Backfill {
            application,
            platform,
            channel,
            from,
            to,
        } => {
            let mut date = from;
            while date <= to {
                // overlapping historical windows: always safe mode
                let report = engine
                    .refresh_dimension(
                        &application,
                        &platform,
                        &channel,
                        IngestOptions {
                            submission_date: Some(date),
                            bulk: false,
                        },
                    )
                    .await?;
                info!("Backfilled {}: {} inserted", date, report.inserted);
                date = date
                    .succ_opt()
                    .ok_or_else(|| anyhow!("date overflow past {}", date))?;
            }
        }
        Commands::SyncBuilds => {
            let store = engine.store()?;
            let recorded =
                buildhub::sync_builds(&store, engine.catalog(), engine.buildhub()).await?;
            info!("Recorded {} new builds", recorded);
        }
        Commands::IngestExperiment { experiment } => {
            let inserted = experiment::update_experiment(&engine, &experiment).await?;
            info!("Ingested {} branch samples", inserted);
        }
        Commands::Summary {
            application,
            platform,
            channel,
            measure,
        } => {
            let summary = service::measure_summary(
                &engine,
                &SummaryParams {
                    application: Some(application),
                    platform: Some(platform),
                    channel: Some(channel),
                    measure: Some(measure),
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Data {
            application,
            platform,
            channel,
            measure,
            interval,
            start,
            relative,
            versions,
        } => {
            let data = service::measure_data(
                &engine,
                &MeasureDataParams {
                    application: Some(application),
                    platform: Some(platform),
                    channel: Some(channel),
                    measure: Some(measure),
                    interval: Some(interval),
                    start,
                    relative,
                    versions,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::ExperimentData {
            experiment,
            measure,
            interval,
            start,
        } => {
            let data = service::experiment_data(
                &engine,
                &ExperimentDataParams {
                    experiment: Some(experiment),
                    measure: Some(measure),
                    interval: Some(interval),
                    start,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Catalog { platform, channel } => {
            let summary =
                service::catalog_summary(&engine, &CatalogSummaryParams { platform, channel });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Expire => {
            let cutoff = Utc::now() - Duration::days(engine.config().retention.days);
            let store = engine.store()?;
            let (samples, branch_samples) = store.prune_older_than(cutoff.timestamp())?;
            info!(
                "Expired {} samples and {} branch samples older than {}",
                samples,
                branch_samples,
                cutoff.format("%Y-%m-%d")
            );
        }
    }

    Ok(())
}
