//! # Cell Telemetry Sync
//!
//! Sample position and LTE cell measurements, queue them durably, and
//! deliver them to a remote collector.
//!
//! ## Usage
//!
//! ```text
//! cell-telemetry-sync [--config <path>] [run]
//! cell-telemetry-sync [--config <path>] drain [host:port]
//! cell-telemetry-sync [--config <path>] clear
//! cell-telemetry-sync [--config <path>] status
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use cell_telemetry_sync::config::{is_valid_address, Config, LoggingConfig};
use cell_telemetry_sync::queue::DurableQueue;
use cell_telemetry_sync::sampler::{Sampler, SnapshotFileProvider};
use cell_telemetry_sync::sync::{SyncClient, SyncCoordinator, SyncEvent};

/// Config file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `logging.log_dir`
const LOG_FILE_PREFIX: &str = "cell-telemetry-sync.log";

/// Sample LTE cell telemetry and deliver it to a collector
#[derive(Parser, Debug)]
#[command(name = "cell-telemetry-sync")]
#[command(about = "Sample LTE cell telemetry and deliver it to a collector")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Periodic sampling and delivery until Ctrl+C
    Run,

    /// One manual drain of the pending queue
    Drain {
        /// Collector address as host:port (defaults to the configured one)
        address: Option<String>,
    },

    /// Delete every pending record
    Clear,

    /// Print the number of pending records
    Status,
}

impl Cli {
    fn config_path(&self) -> &Path {
        self.config
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH))
    }

    /// True when `--config` was given explicitly
    fn config_explicit(&self) -> bool {
        self.config.is_some()
    }

    fn selected_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// Load the config file; a missing default file falls back to built-in
/// defaults, a missing explicit file is an error.
fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !explicit && !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Install stdout logging plus an optional daily-rolling file layer.
///
/// The returned guard must live as long as logging is needed.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.parse()?);

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::CycleCompleted { outcome, at } => debug!("[{}] cycle: {:?}", at.to_rfc3339(), outcome),
        SyncEvent::TickDropped { at } => debug!("[{}] tick dropped, cycle in flight", at.to_rfc3339()),
        SyncEvent::DrainCompleted { outcome, at } => info!("[{}] drain: {:?}", at.to_rfc3339(), outcome),
        SyncEvent::QueueCleared { at } => info!("[{}] queue cleared", at.to_rfc3339()),
    }
}

/// Main entry point
///
/// # Control Flow
///
/// 1. Parse arguments and load configuration
/// 2. Set up logging
/// 3. Wire queue, sampler, client, and coordinator
/// 4. Run the requested command
///
/// # Errors
///
/// Returns error if configuration is invalid, the queue file cannot be
/// accessed, or a requested drain fails.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config_path(), cli.config_explicit())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Cell Telemetry Sync v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Using configuration: {:?}", config);

    let queue = Arc::new(DurableQueue::new(&config.queue.path));
    let client = SyncClient::tcp(
        config.collector.send_timeout(),
        config.collector.receive_timeout(),
        Arc::clone(&queue),
    );
    let provider = Arc::new(SnapshotFileProvider::new(&config.sampler.snapshot_path));
    let sampler = Sampler::new(provider.clone(), provider);
    let coordinator = Arc::new(SyncCoordinator::new(
        sampler,
        client,
        Arc::clone(&queue),
        config.collector.address.clone(),
    ));

    match cli.selected_command() {
        Command::Run => {
            let mut events = coordinator.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    log_event(&event);
                }
            });

            info!("Pending records at startup: {}", coordinator.pending_count().await?);
            info!("Press Ctrl+C to exit");

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Received Ctrl+C, shutting down...");
            };
            Arc::clone(&coordinator)
                .run(config.sampler.interval(), shutdown)
                .await;

            info!("Pending records at exit: {}", coordinator.pending_count().await?);
        }

        Command::Drain { address } => {
            let address = address.unwrap_or_else(|| config.collector.address.clone());
            if !is_valid_address(&address) {
                bail!("address '{}' must be host:port", address);
            }

            let outcome = coordinator.trigger_manual_drain(&address).await;
            if !outcome.is_success() {
                bail!("drain to {} failed ({:?})", address, outcome);
            }
            info!("Drain complete: {:?}", outcome);
        }

        Command::Clear => {
            coordinator.clear_queue().await?;
        }

        Command::Status => {
            println!("{}", coordinator.pending_count().await?);
        }
    }

    Ok(())
}
