//! OS signal handling and the restart state machine.
//!
//! # Responsibilities
//! - Register handlers for SIGHUP, SIGUSR2, SIGINT, SIGQUIT and SIGTERM
//! - Translate each signal into a [`SignalRole`]
//! - Drive the process through `Serving → Draining → Stopped`
//!
//! # Design Decisions
//! - Signals reach the coordinator over an mpsc channel so tests can drive
//!   it without touching process-wide signal state
//! - A failed spawn leaves the process serving
//! - Once draining, further signals are consumed and ignored

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};

use crate::config::AppConfig;
use crate::http::{DrainError, ServerHandle};
use crate::lifecycle::spawn::ChildSpawner;
use crate::observability::metrics;

/// What a received signal asks the process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalRole {
    /// Start a replacement, then drain and exit.
    Restart,
    /// Start an additional process and keep serving.
    Reload,
    /// Drain and exit.
    Terminate,
}

impl SignalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalRole::Restart => "restart",
            SignalRole::Reload => "reload",
            SignalRole::Terminate => "terminate",
        }
    }

    /// Signal number that requests this role.
    ///
    /// Terminate is also requested by SIGINT and SIGQUIT.
    pub fn signal_number(&self) -> libc::c_int {
        match self {
            SignalRole::Restart => libc::SIGHUP,
            SignalRole::Reload => libc::SIGUSR2,
            SignalRole::Terminate => libc::SIGTERM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Serving,
    Draining,
    Stopped,
}

/// Start forwarding process signals as [`SignalRole`]s.
///
/// Handlers are installed before this returns.
pub fn os_signals() -> io::Result<mpsc::Receiver<SignalRole>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user2 = signal(SignalKind::user_defined2())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            let (name, role) = tokio::select! {
                Some(()) = hangup.recv() => ("SIGHUP", SignalRole::Restart),
                Some(()) = user2.recv() => ("SIGUSR2", SignalRole::Reload),
                Some(()) = interrupt.recv() => ("SIGINT", SignalRole::Terminate),
                Some(()) = quit.recv() => ("SIGQUIT", SignalRole::Terminate),
                Some(()) = terminate.recv() => ("SIGTERM", SignalRole::Terminate),
                else => break,
            };
            tracing::info!(signal = name, role = role.as_str(), "Signal received");
            if tx.send(role).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Observable progress of a [`SignalCoordinator`].
#[derive(Debug)]
pub struct CoordinatorStatus {
    state: watch::Sender<CoordinatorState>,
    spawn_attempts: AtomicU64,
    children_spawned: AtomicU64,
    signals_ignored: AtomicU64,
}

impl CoordinatorStatus {
    fn new() -> Self {
        Self {
            state: watch::Sender::new(CoordinatorState::Serving),
            spawn_attempts: AtomicU64::new(0),
            children_spawned: AtomicU64::new(0),
            signals_ignored: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    pub fn spawn_attempts(&self) -> u64 {
        self.spawn_attempts.load(Ordering::Relaxed)
    }

    pub fn children_spawned(&self) -> u64 {
        self.children_spawned.load(Ordering::Relaxed)
    }

    pub fn signals_ignored(&self) -> u64 {
        self.signals_ignored.load(Ordering::Relaxed)
    }

    fn transition(&self, next: CoordinatorState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Coordinator state changed");
    }
}

/// Reacts to signals for one process incarnation.
pub struct SignalCoordinator {
    spawner: ChildSpawner,
    server: ServerHandle,
    config: Arc<ArcSwap<AppConfig>>,
    status: Arc<CoordinatorStatus>,
}

impl SignalCoordinator {
    pub fn new(
        spawner: ChildSpawner,
        server: ServerHandle,
        config: Arc<ArcSwap<AppConfig>>,
    ) -> Self {
        Self {
            spawner,
            server,
            config,
            status: Arc::new(CoordinatorStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<CoordinatorStatus> {
        Arc::clone(&self.status)
    }

    /// Serve until a restart or terminate, then drain.
    ///
    /// Returns once the server has stopped; the caller is expected to exit.
    /// A closed signal channel is treated as terminate.
    pub async fn run(self, mut signals: mpsc::Receiver<SignalRole>) -> Result<(), DrainError> {
        let Self {
            spawner,
            server,
            config,
            status,
        } = self;

        loop {
            let Some(role) = signals.recv().await else {
                tracing::warn!("Signal channel closed, shutting down");
                break;
            };
            metrics::record_signal(role.as_str());
            tracing::info!(
                role = role.as_str(),
                state = ?CoordinatorState::Serving,
                in_flight = server.in_flight(),
                "Handling signal"
            );

            match role {
                SignalRole::Restart => {
                    if spawn(&spawner, &status).is_some() {
                        break;
                    }
                }
                SignalRole::Reload => {
                    spawn(&spawner, &status);
                }
                SignalRole::Terminate => break,
            }
        }

        status.transition(CoordinatorState::Draining);
        let timeout = config.load().drain_timeout();
        let drain = server.drain(timeout);
        tokio::pin!(drain);

        let result = loop {
            tokio::select! {
                result = &mut drain => break result,
                Some(role) = signals.recv() => {
                    metrics::record_signal(role.as_str());
                    status.signals_ignored.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        role = role.as_str(),
                        state = ?CoordinatorState::Draining,
                        "Ignoring signal while draining"
                    );
                }
            }
        };

        status.transition(CoordinatorState::Stopped);
        match &result {
            Ok(()) => metrics::record_drain("clean"),
            Err(DrainError::Timeout { .. }) => metrics::record_drain("timeout"),
            Err(_) => metrics::record_drain("error"),
        }
        result
    }
}

fn spawn(spawner: &ChildSpawner, status: &CoordinatorStatus) -> Option<u32> {
    status.spawn_attempts.fetch_add(1, Ordering::Relaxed);
    match spawner.spawn_replacement() {
        Ok(pid) => {
            status.children_spawned.fetch_add(1, Ordering::Relaxed);
            metrics::record_spawn("ok");
            Some(pid)
        }
        Err(e) => {
            metrics::record_spawn("error");
            tracing::error!(
                error = %e,
                address = spawner.address(),
                "Failed to spawn replacement, still serving"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{routing::get, Router};

    use super::*;
    use crate::http::HttpServer;
    use crate::net::create_listener;

    fn coordinator(program: &str) -> SignalCoordinator {
        let config = AppConfig::default();
        let listener = Arc::new(create_listener("127.0.0.1:0").unwrap());
        let server = HttpServer::new(&config, Router::new().route("/", get(|| async { "ok" })))
            .serve(&listener)
            .unwrap();
        let spawner = ChildSpawner::new("127.0.0.1:0", listener)
            .with_program(program)
            .with_args(Vec::<String>::new());
        SignalCoordinator::new(spawner, server, Arc::new(ArcSwap::from_pointee(config)))
    }

    #[test]
    fn roles_map_to_signals() {
        assert_eq!(SignalRole::Restart.signal_number(), libc::SIGHUP);
        assert_eq!(SignalRole::Reload.signal_number(), libc::SIGUSR2);
        assert_eq!(SignalRole::Terminate.signal_number(), libc::SIGTERM);
        assert_eq!(SignalRole::Reload.as_str(), "reload");
    }

    #[tokio::test]
    async fn terminate_stops_idle_server() {
        let coordinator = coordinator("/bin/true");
        let status = coordinator.status();
        let (tx, rx) = mpsc::channel(4);
        tx.send(SignalRole::Terminate).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), coordinator.run(rx))
            .await
            .expect("coordinator did not stop")
            .unwrap();

        assert_eq!(status.state(), CoordinatorState::Stopped);
        assert_eq!(status.spawn_attempts(), 0);
    }

    #[tokio::test]
    async fn failed_restart_keeps_serving() {
        let coordinator = coordinator("/nonexistent/dragonfly");
        let status = coordinator.status();
        let (tx, rx) = mpsc::channel(4);
        let run = tokio::spawn(coordinator.run(rx));

        tx.send(SignalRole::Restart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(status.state(), CoordinatorState::Serving);
        assert_eq!(status.spawn_attempts(), 1);
        assert_eq!(status.children_spawned(), 0);

        tx.send(SignalRole::Terminate).await.unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(status.state(), CoordinatorState::Stopped);
    }

    #[tokio::test]
    async fn reload_spawns_without_draining() {
        let coordinator = coordinator("/bin/true");
        let status = coordinator.status();
        let (tx, rx) = mpsc::channel(4);
        let run = tokio::spawn(coordinator.run(rx));

        tx.send(SignalRole::Reload).await.unwrap();
        tx.send(SignalRole::Reload).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(status.state(), CoordinatorState::Serving);
        assert_eq!(status.children_spawned(), 2);

        tx.send(SignalRole::Terminate).await.unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_channel_drains() {
        let coordinator = coordinator("/bin/true");
        let status = coordinator.status();
        let (tx, rx) = mpsc::channel::<SignalRole>(1);
        drop(tx);

        coordinator.run(rx).await.unwrap();
        assert_eq!(status.state(), CoordinatorState::Stopped);
    }
}
