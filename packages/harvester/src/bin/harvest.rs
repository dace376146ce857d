//! Harvest CLI
//!
//! Runs a bulk harvest, a detail backfill, or both, against the search
//! portal and a PostgreSQL record store. Prints the run report as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvester::{
    BackfillReport, DetailSource, Enumerator, HarvestConfig, HarvestError, HarvestSummary,
    Harvester, HttpTransport, HttpTransportConfig, PostgresStore, QueryTransport,
    RateLimitedTransport,
};
use serde::Serialize;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Harvest warrant records from the search portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Partition the query space and fetch every record
    Bulk {
        /// Region ids to harvest (defaults to all)
        #[arg(long, value_delimiter = ',')]
        regions: Option<Vec<i64>>,
    },

    /// Fetch detail documents for records that lack one
    Details,

    /// Bulk harvest followed by detail backfill
    All {
        #[arg(long, value_delimiter = ',')]
        regions: Option<Vec<i64>>,
    },
}

/// Settings loaded from the environment
struct Settings {
    database_url: String,
    cookie: String,
    base_url: Option<String>,
    requests_per_second: Option<u32>,
    harvest: HarvestConfig,
}

impl Settings {
    fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let mut harvest = HarvestConfig::default();
        if let Some(pool_size) = parse_var("HARVEST_POOL_SIZE")? {
            harvest = harvest.with_pool_size(pool_size);
        }
        if let Some(cap) = parse_var("HARVEST_HARD_CAP")? {
            harvest = harvest.with_hard_cap(cap);
        }
        if let Some(threshold) = parse_var("HARVEST_SINGLE_PASS_THRESHOLD")? {
            harvest = harvest.with_single_pass_threshold(threshold);
        }
        if let Some(max_pages) = parse_var("HARVEST_MAX_PAGES")? {
            harvest = harvest.with_max_pages(max_pages);
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            cookie: env::var("HARVEST_COOKIE").context("HARVEST_COOKIE must be set")?,
            base_url: env::var("HARVEST_BASE_URL").ok(),
            requests_per_second: parse_var("HARVEST_REQUESTS_PER_SECOND")?,
            harvest,
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(None),
    }
}

#[derive(Serialize)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    harvest: Option<HarvestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backfill: Option<BackfillReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,harvester=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Commands::Bulk {
        regions: Some(regions),
    }
    | Commands::All {
        regions: Some(regions),
    } = &cli.command
    {
        settings.harvest = settings.harvest.with_regions(regions.iter().copied());
    }

    let pool_size = u32::try_from(settings.harvest.pool_size).unwrap_or(u32::MAX);
    let store = PostgresStore::connect(&settings.database_url, pool_size)
        .await
        .context("Failed to connect to database")?;

    let mut transport_config = HttpTransportConfig::new(settings.cookie);
    if let Some(base_url) = settings.base_url {
        transport_config = transport_config.with_base_url(base_url);
    }
    let transport = HttpTransport::new(transport_config)?;

    let report = match settings.requests_per_second {
        Some(rps) => {
            let transport = RateLimitedTransport::new(transport, rps)?;
            run(Harvester::new(transport, store, settings.harvest)?, cli.command).await?
        }
        None => run(Harvester::new(transport, store, settings.harvest)?, cli.command).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run<T>(harvester: Harvester<T, PostgresStore>, command: Commands) -> Result<Report>
where
    T: QueryTransport + Enumerator + DetailSource,
{
    let mut report = Report {
        harvest: None,
        backfill: None,
    };

    if matches!(command, Commands::Bulk { .. } | Commands::All { .. }) {
        let summary = harvester.harvest().await.map_err(explain)?;
        report.harvest = Some(summary);
    }
    if matches!(command, Commands::Details | Commands::All { .. }) {
        let backfill = harvester.backfill().await.map_err(explain)?;
        report.backfill = Some(backfill);
    }

    Ok(report)
}

/// Tell the operator what to do about a failed run.
fn explain(err: HarvestError) -> anyhow::Error {
    let hint = match &err {
        HarvestError::Authentication { .. } => {
            "Credentials rejected: refresh HARVEST_COOKIE and restart the run"
        }
        HarvestError::UnexpectedResponse(_) | HarvestError::Api { .. } => {
            "The API returned an unexpected response; the run was aborted"
        }
        HarvestError::Storage(_) => "Record store failure",
        HarvestError::Transport(_) | HarvestError::Config(_) => "Harvest failed",
    };
    anyhow::Error::new(err).context(hint)
}
