//! Delivery dispatch: greedy order-to-agent allocation with daily scheduling
//! and read-only reporting over a shared SQLite store.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use dispatch::models::{DispatchConfig, Location, NewOrder};
//! use dispatch::engine::{Allocator, Reporter};
//! use dispatch::store::{SqliteStore, Store};
//! use dispatch::scheduler::Scheduler;
//! ```

pub use dispatch_engine as engine;
pub use dispatch_models as models;
pub use dispatch_scheduler as scheduler;
pub use dispatch_store as store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dispatch_engine::{Allocator, Reporter};
use dispatch_models::DispatchConfig;
use dispatch_store::SqliteStore;

/// Read, parse and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<DispatchConfig, anyhow::Error> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: DispatchConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {e}"))?;
    Ok(config)
}

pub fn open_store(config: &DispatchConfig) -> Result<Arc<SqliteStore>, anyhow::Error> {
    let store = SqliteStore::open(&config.store.sqlite_path)
        .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?;
    Ok(Arc::new(store))
}

pub fn build_allocator(config: &DispatchConfig, store: Arc<SqliteStore>) -> Allocator {
    Allocator::from_config(store, config.allocation.clone())
}

pub fn build_reporter(config: &DispatchConfig, store: Arc<SqliteStore>) -> Reporter {
    Reporter::new(store, &config.reporting)
}
