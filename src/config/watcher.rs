//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file changed");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply updates from a [`ConfigWatcher`] to the live configuration.
///
/// Listener settings are fixed for the lifetime of a process; a change to
/// them is logged and takes effect on the next restart signal.
pub async fn apply_updates(
    live: Arc<ArcSwap<AppConfig>>,
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
) {
    while let Some(new_config) = updates.recv().await {
        let current = live.load();
        if new_config == **current {
            continue;
        }
        if new_config.listen_address() != current.listen_address() {
            tracing::warn!(
                current = %current.listen_address(),
                configured = %new_config.listen_address(),
                "Listen address changed; send a restart signal to apply it"
            );
        }
        tracing::info!(
            drain_timeout_secs = new_config.lifecycle.drain_timeout_secs,
            "Configuration reloaded"
        );
        live.store(Arc::new(new_config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn updates_are_swapped_in() {
        let live = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut changed = AppConfig::default();
        changed.lifecycle.drain_timeout_secs = 11;
        tx.send(changed).unwrap();
        drop(tx);

        apply_updates(live.clone(), rx).await;
        assert_eq!(live.load().lifecycle.drain_timeout_secs, 11);
    }
}
