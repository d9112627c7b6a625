use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch_engine::Allocator;
use dispatch_models::DispatchConfig;
use dispatch_scheduler::Scheduler;
use dispatch_store::SqliteStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dispatch-scheduler",
    about = "Delivery dispatch scheduler - runs the daily order allocation pass against the shared SQLite store"
)]
struct Cli {
    /// Path to dispatch configuration file
    #[arg(short, long, env = "DISPATCH_CONFIG", default_value = "config/dispatch.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: DispatchConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse dispatch config")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid dispatch config: {e}"))?;

    let store = SqliteStore::open(&config.store.sqlite_path)
        .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?;
    let allocator = Arc::new(Allocator::from_config(
        Arc::new(store),
        config.allocation.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(allocator, config.schedule.clone())?);
    let cancel = scheduler.cancel_token();

    // Handle shutdown signals
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    #[cfg(unix)]
    let trigger = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = usr1.recv() => {
                        if received.is_none() {
                            break;
                        }
                        tracing::info!("Received SIGUSR1");
                        if let Err(e) = scheduler.trigger_now().await {
                            tracing::warn!(error = %e, "Manual allocation pass rejected");
                        }
                    }
                }
            }
        })
    };

    scheduler.run().await;

    #[cfg(unix)]
    let _ = trigger.await;

    Ok(())
}
