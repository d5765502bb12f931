//! CLI entry point for the GTFS-RT enricher.
//!
//! Provides subcommands for refreshing the static schedule into a store,
//! enriching live vehicle positions and trip updates, and validating a
//! stored schedule.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use gtfs_rt_enricher::{
    config::{
        DEFAULT_BATCH_SIZE, DEFAULT_STATIC_URL, DEFAULT_TRIP_UPDATES_URL, DEFAULT_VEHICLES_URL,
        FeedConfig, StoreConfig,
    },
    enrich::Enricher,
    fetch::BasicClient,
    gtfs_rt::FeedMessage,
    output::{VehicleRow, append_records, print_json, print_pretty},
    parser::{decode_feed, fetch_feed},
    schedule::{self, ScheduleIndex, load_archive},
    snapshot::SnapshotFormat,
    stats::{FeedStats, ScheduleStats},
    store::{ScheduleStore, SnapshotStore, SqlStore},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_enricher")]
#[command(about = "Join GTFS-Realtime feeds against the GTFS static schedule", long_about = None)]
struct Cli {
    /// Stderr log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Request timeout in seconds for every HTTP fetch
    #[arg(long, global = true, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

/// Where the schedule is read from (database, then snapshot, then static feed)
/// or, for `update`, where it is written to.
#[derive(Args, Debug)]
struct ScheduleSource {
    /// sqlite:, mysql: or postgres: connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Binary snapshot file (.json for a JSON snapshot)
    #[arg(long, env = "GTFS_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// GTFS static ZIP, URL or local path
    #[arg(long, env = "GTFS_STATIC_URL", default_value = DEFAULT_STATIC_URL)]
    static_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the static schedule and replace what is stored
    Update {
        #[command(flatten)]
        source: ScheduleSource,

        /// Also write a JSON snapshot here
        #[arg(long)]
        json: Option<PathBuf>,

        /// Gzip the snapshot unless its path ends in .json
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Rows per database insert batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Fetch vehicle positions and enrich them with the schedule
    Vehicles {
        #[command(flatten)]
        source: ScheduleSource,

        /// Vehicle positions feed, URL or local path
        #[arg(long, env = "GTFS_VEHICLES_URL", default_value = DEFAULT_VEHICLES_URL)]
        vehicles_url: String,

        /// Only show this route short name (e.g. "37")
        #[arg(short, long)]
        route: Option<String>,

        /// CSV file to append vehicle rows to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Fetch trip updates and enrich them with the schedule
    Trips {
        #[command(flatten)]
        source: ScheduleSource,

        /// Trip updates feed, URL or local path
        #[arg(long, env = "GTFS_TRIP_UPDATES_URL", default_value = DEFAULT_TRIP_UPDATES_URL)]
        trip_updates_url: String,

        /// Only show this route short name (e.g. "37")
        #[arg(short, long)]
        route: Option<String>,
    },
    /// Load the schedule and report per-table counts
    Validate {
        #[command(flatten)]
        source: ScheduleSource,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_rt_enricher.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_enricher.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::from_env("RUST_LOG")
                .add_directive(cli.log_level.parse().context("invalid --log-level")?),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let feeds = FeedConfig {
        timeout: Duration::from_secs(cli.timeout_secs),
        ..FeedConfig::default()
    };
    let client = BasicClient::new(feeds.timeout)?;

    match cli.command {
        Commands::Update {
            source,
            json,
            gzip,
            batch_size,
        } => {
            let index = fetch_schedule(&client, &source.static_url).await?;
            ScheduleStats::from_index(&index).log();

            let mut stores: Vec<Box<dyn ScheduleStore>> = Vec::new();
            if let Some(url) = source.database_url {
                let config = StoreConfig {
                    database_url: url,
                    batch_size,
                };
                stores.push(Box::new(SqlStore::connect(&config).await?));
            }
            if let Some(path) = source.snapshot {
                stores.push(Box::new(SnapshotStore::for_path(path, gzip)));
            }
            if let Some(path) = json {
                stores.push(Box::new(SnapshotStore::new(path, SnapshotFormat::Json)));
            }
            if stores.is_empty() {
                warn!("No --database-url, --snapshot or --json given; schedule parsed but not stored");
            }

            for store in &stores {
                store
                    .replace_schedule(&index)
                    .await
                    .context("failed to store schedule")?;
            }
            info!(stores = stores.len(), "Update complete");
        }
        Commands::Vehicles {
            source,
            vehicles_url,
            route,
            output,
        } => {
            let enricher = Enricher::new(Arc::new(load_schedule(&client, &source).await?));
            let feed = realtime(&client, &vehicles_url).await?;
            FeedStats::from_feed(&feed).with_feed_name("vehicles").log();

            let mut enriched = enricher.enrich_feed(&feed)?;
            if let Some(route) = &route {
                enriched.vehicles.retain(|short_name, _| short_name == route);
                if enriched.vehicles.is_empty() {
                    warn!(route = %route, "No vehicles on route");
                }
            }
            info!(
                vehicles = enriched.vehicle_count(),
                routes = enriched.vehicles.len(),
                "Vehicles enriched"
            );

            if let Some(path) = output {
                let rows = VehicleRow::from_groups(&enriched.vehicles, Utc::now());
                append_records(&path, &rows)?;
            }
            print_json(&enriched.vehicles)?;
        }
        Commands::Trips {
            source,
            trip_updates_url,
            route,
        } => {
            let enricher = Enricher::new(Arc::new(load_schedule(&client, &source).await?));
            let feed = realtime(&client, &trip_updates_url).await?;
            FeedStats::from_feed(&feed).with_feed_name("trip_updates").log();

            let mut enriched = enricher.enrich_feed(&feed)?;
            if let Some(route) = &route {
                enriched.trip_updates.retain(|short_name, _| short_name == route);
                if enriched.trip_updates.is_empty() {
                    warn!(route = %route, "No trip updates on route");
                }
            }
            info!(
                trip_updates = enriched.trip_update_count(),
                alerts_skipped = enriched.alerts_skipped,
                "Trip updates enriched"
            );
            print_json(&enriched.trip_updates)?;
        }
        Commands::Validate { source } => {
            let index = load_schedule(&client, &source).await?;
            let stats = ScheduleStats::from_index(&index);
            stats.log();
            print_pretty(&stats);
            print_json(&stats)?;
        }
    }

    Ok(())
}

/// Loads the schedule from the first configured source: database, then
/// snapshot, then a fresh static feed.
async fn load_schedule(client: &BasicClient, source: &ScheduleSource) -> Result<ScheduleIndex> {
    let store: Box<dyn ScheduleStore> = if let Some(url) = &source.database_url {
        Box::new(SqlStore::connect(&StoreConfig::new(url.clone())).await?)
    } else if let Some(path) = &source.snapshot {
        Box::new(SnapshotStore::for_path(path.clone(), false))
    } else {
        return fetch_schedule(client, &source.static_url).await;
    };

    store
        .load_schedule()
        .await
        .context("failed to load stored schedule")
}

/// Parses the static ZIP from a URL or a local path.
#[tracing::instrument(skip(client))]
async fn fetch_schedule(client: &BasicClient, source: &str) -> Result<ScheduleIndex> {
    let index = if source.starts_with("http") {
        schedule::update(client, source).await?
    } else {
        let bytes = std::fs::read(source).with_context(|| format!("reading {source}"))?;
        load_archive(&bytes)?
    };
    Ok(index)
}

/// Decodes a realtime feed from a URL or a local path.
#[tracing::instrument(skip(client))]
async fn realtime(client: &BasicClient, source: &str) -> Result<FeedMessage> {
    let feed = if source.starts_with("http") {
        fetch_feed(client, source).await?
    } else {
        let bytes = std::fs::read(source).with_context(|| format!("reading {source}"))?;
        decode_feed(&bytes)?
    };
    Ok(feed)
}
