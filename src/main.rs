use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use statusdeck::config::Config;
use statusdeck::logging;
use statusdeck::monitoring::notifier::{AllowAllPreferences, LogPublisher, LogSink};
use statusdeck::monitoring::{MonitorScheduler, NotificationDispatcher};
use statusdeck::retention::{RetentionPolicy, RetentionPruner};
use statusdeck::storage::LibsqlStorage;

/// Service health monitoring daemon
#[derive(Parser, Debug)]
#[command(name = "statusdeck", version, about)]
struct Args {
    /// Path to the config file (defaults to
    /// $XDG_CONFIG_HOME/statusdeck/config.toml, created if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args = Args::parse();
    let config = Config::from_config(args.config).context("failed to load configuration")?;
    tracing::debug!("{config}");

    let storage = Arc::new(
        LibsqlStorage::open(&config.database.path)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path))?,
    );

    let dispatcher = Arc::new(NotificationDispatcher::new(
        storage.clone(),
        Arc::new(LogSink),
        Arc::new(AllowAllPreferences),
    ));

    let scheduler = Arc::new(MonitorScheduler::new(
        storage.clone(),
        dispatcher,
        Arc::new(LogPublisher),
    ));
    scheduler.start().await.context("failed to start monitor scheduler")?;
    tracing::info!(monitors = scheduler.live_count().await, "scheduler started");

    let pruner = Arc::new(RetentionPruner::new(
        storage.clone(),
        RetentionPolicy::from(&config.retention),
    ));
    let pruner_handle = pruner.start_periodic();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    pruner_handle.abort();
    scheduler.shutdown().await;

    Ok(())
}
