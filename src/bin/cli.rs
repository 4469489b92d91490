//! Estate Watcher CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use estate_watcher::{
    config::load_config,
    error::Result,
    models::{Config, StorageBackend},
    pipeline::{self, StationIndex, Watcher},
    storage::{self, HitOutbox, SnapshotStore},
};

/// Rendering of a drained hit.
const HIT_TEMPLATE: &str =
    "{price} CZK  {link}\n    {name}, {locality}\n    {station} ({station_km} km), {minutes} min, {transfers} transfers";

/// Estate Watcher - new listing alerts with commute times
#[derive(Parser, Debug)]
#[command(
    name = "estate-watcher",
    version,
    about = "Watches a listing source and queues new matching listings"
)]
struct Cli {
    /// Storage directory; holds config.toml and the local store
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run watch cycles until Ctrl-C
    Watch,

    /// Run a single cycle
    Once,

    /// Print and remove queued hits, oldest first
    Drain {
        /// Stop after this many hits
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Validate configuration and station data
    Validate,

    /// Show snapshot and outbox info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| {
        cli.storage_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("storage"))
            .join("config.toml")
    })
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is not up yet while the config loads, so peek at the level first.
    let path = config_path(&cli);
    let level = Config::load(&path)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let mut config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
    };
    if let Some(dir) = &cli.storage_dir {
        config.storage.root = dir.clone();
    }

    match cli.command {
        Command::Watch => {
            let store = storage::open_store(&config.storage).await?;
            let mut watcher = Watcher::from_config(&config, store).await?;

            let (tx, rx) = pipeline::shutdown_channel();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::info!("Ctrl-C received, finishing up");
                        let _ = tx.send(true);
                    }
                    Err(e) => {
                        log::error!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            });

            watcher.watch(rx).await;
        }

        Command::Once => {
            let store = storage::open_store(&config.storage).await?;
            let watcher = Watcher::from_config(&config, store).await?;

            let report = watcher.run_cycle().await?;
            report.log_summary();
            for key in &report.emitted {
                println!("{key}");
            }
        }

        Command::Drain { limit } => {
            let store = storage::open_store(&config.storage).await?;
            let outbox = HitOutbox::new(store, &config.storage.outbox_prefix);

            let mut drained = 0;
            while limit.is_none_or(|limit| drained < limit) {
                let Some(entry) = outbox.peek_oldest().await? else {
                    break;
                };
                println!("{}\n", entry.listing.format(HIT_TEMPLATE));
                outbox.delete(&entry.key).await?;
                drained += 1;
            }

            log::info!("Drained {} hits", drained);
        }

        Command::Validate => {
            log::info!("✓ Config OK ({})", path.display());

            let stations = config
                .routing
                .stations_path
                .as_ref()
                .filter(|_| config.routing.enabled);
            if let Some(stations) = stations {
                let index = StationIndex::load(stations).await?;
                log::info!("✓ Stations OK ({} stations)", index.len());
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            if config.storage.backend == StorageBackend::Local {
                log::info!("Storage directory: {}", config.storage.root.display());
            }
            let store = storage::open_store(&config.storage).await?;
            let snapshot = SnapshotStore::new(store.clone(), &config.storage.snapshot_prefix);
            let outbox = HitOutbox::new(store, &config.storage.outbox_prefix);

            log::info!("Backend: {:?}", config.storage.backend);
            log::info!("Snapshot listings: {}", snapshot.len().await?);
            log::info!("Queued hits: {}", outbox.count().await?);
            let dead = outbox.dead_count().await?;
            if dead > 0 {
                log::warn!("Unreadable hits moved aside: {}", dead);
            }
            if let Some(oldest) = outbox.peek_oldest().await? {
                log::info!("Oldest hit: {}", oldest.key);
            }
        }
    }

    Ok(())
}
