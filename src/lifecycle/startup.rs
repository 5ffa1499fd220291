//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Install signal handlers before the listener is acquired
//! - Acquire the listener (inherited or fresh) and start serving
//! - Hand control to the signal coordinator until the process should exit
//!
//! # Design Decisions
//! - Fail fast: config, listener and signal errors are fatal
//! - A missing config file is not an error; defaults apply

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use thiserror::Error;

use crate::config::watcher::{apply_updates, ConfigWatcher};
use crate::config::{load_config, locate_config, AppConfig, ConfigError};
use crate::http::{routes, DrainError, HttpServer};
use crate::lifecycle::signals::{os_signals, SignalCoordinator};
use crate::lifecycle::spawn::ChildSpawner;
use crate::net::{ListenerAcquirer, ListenerError};
use crate::observability::{logging::init_logging, metrics::init_metrics};
use crate::store::{KvStore, MemoryStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed to start HTTP server: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Drain(#[from] DrainError),
}

/// Command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Explicit config file; otherwise the default locations are searched.
    pub config: Option<PathBuf>,
    /// Listen address; otherwise derived from the config.
    pub address: Option<String>,
}

/// Run one process incarnation to completion.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let config_path = locate_config(options.config.as_deref());
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    init_logging(&config.observability);
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file found, using defaults"),
    }

    let signals = os_signals().map_err(StartupError::Signals)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let live = Arc::new(ArcSwap::from_pointee(config.clone()));
    let _watcher = config_path.and_then(|path| watch_config(path, Arc::clone(&live)));

    let address = options
        .address
        .unwrap_or_else(|| config.listen_address());
    let mut acquirer = ListenerAcquirer::from_env(config.lifecycle.strict_handoff);
    if acquirer.has_descriptor() {
        tracing::debug!(address = %address, "Inherited listener descriptor present");
    }
    let listener = Arc::new(acquirer.acquire(&address)?);

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let server = HttpServer::new(&config, routes::router(store))
        .serve(&listener)
        .map_err(StartupError::Serve)?;

    tracing::info!(
        address = %address,
        listener = %listener.describe(),
        pid = std::process::id(),
        drain_timeout_secs = config.lifecycle.drain_timeout_secs,
        "dragonfly serving"
    );

    let spawner = ChildSpawner::new(address, Arc::clone(&listener));
    SignalCoordinator::new(spawner, server, live)
        .run(signals)
        .await?;

    tracing::info!(pid = std::process::id(), "Exiting");
    Ok(())
}

fn watch_config(path: PathBuf, live: Arc<ArcSwap<AppConfig>>) -> Option<RecommendedWatcher> {
    let (watcher, updates) = ConfigWatcher::new(&path);
    match watcher.run() {
        Ok(watcher) => {
            tokio::spawn(apply_updates(live, updates));
            Some(watcher)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Config watching disabled");
            None
        }
    }
}
