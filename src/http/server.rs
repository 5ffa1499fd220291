//! HTTP server shell.
//!
//! # Responsibilities
//! - Wrap an Axum router with tracing, request ID, CORS, timeout and
//!   in-flight tracking
//! - Accept on a duplicate of the process's [`ListenerHandle`]
//! - Drain on request: stop accepting, let accepted connections finish,
//!   give up after a deadline
//!
//! # Design Decisions
//! - Connections are driven by hyper directly so drain can close each one
//!   only after it has delivered its first request
//! - Every connection task is tracked; the server has stopped once the
//!   accept loop and all of its connections have exited

use std::io;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    serve::Listener,
    Router,
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceBuilder};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::http::request::{
    cors_layer, propagate_request_id_layer, set_request_id_layer, track_in_flight,
    InFlightState, X_REQUEST_ID,
};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{InFlightTracker, ListenerHandle};

/// How long a connection accepted before drain began may take to send its
/// first request.
pub const FIRST_REQUEST_GRACE: Duration = Duration::from_secs(1);

/// Why a drain did not finish cleanly.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("drain timed out after {timeout:?} with {remaining} request(s) in flight")]
    Timeout { timeout: Duration, remaining: u64 },

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// HTTP server, ready to be started on a listener.
pub struct HttpServer {
    router: Router,
    tracker: InFlightTracker,
}

impl HttpServer {
    /// Wrap `routes` with the server's middleware stack.
    pub fn new(config: &AppConfig, routes: Router) -> Self {
        let tracker = InFlightTracker::new();
        let router = Self::build_router(config, routes, tracker.clone());
        Self { router, tracker }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, routes: Router, tracker: InFlightTracker) -> Router {
        let in_flight = InFlightState {
            tracker,
            max_in_flight: config.listener.max_in_flight as u64,
        };

        routes
            .layer(middleware::from_fn_with_state(in_flight, track_in_flight))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get(X_REQUEST_ID)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("unknown");
                            tracing::info_span!(
                                "http_request",
                                request_id = %request_id,
                                method = %request.method(),
                                path = %request.uri().path(),
                            )
                        },
                    ))
                    .layer(propagate_request_id_layer())
                    .layer(cors_layer())
                    .layer(TimeoutLayer::new(config.request_timeout())),
            )
    }

    /// Start serving on a duplicate of `listener`.
    ///
    /// The caller keeps `listener`; it stays open for handoff after the
    /// server has stopped accepting.
    pub fn serve(self, listener: &ListenerHandle) -> io::Result<ServerHandle> {
        let shutdown = Shutdown::new();
        let force = CancellationToken::new();
        let name = listener.describe();
        let connections = Connections {
            router: self.router,
            stop: shutdown.subscribe(),
            force: force.clone(),
            tasks: TaskTracker::new(),
        };

        let task = match listener.try_clone()? {
            ListenerHandle::Tcp(std_listener) => {
                std_listener.set_nonblocking(true)?;
                let listener = tokio::net::TcpListener::from_std(std_listener)?;
                tokio::spawn(connections.accept_loop(listener))
            }
            ListenerHandle::Unix(std_listener) => {
                std_listener.set_nonblocking(true)?;
                let listener = tokio::net::UnixListener::from_std(std_listener)?;
                tokio::spawn(connections.accept_loop(listener))
            }
        };

        tracing::info!(
            listener = %name,
            pid = std::process::id(),
            "HTTP server started"
        );

        Ok(ServerHandle {
            shutdown,
            force,
            tracker: self.tracker,
            task,
            listener: name,
        })
    }
}

/// State shared by the accept loop and its connection tasks.
struct Connections {
    router: Router,
    stop: ShutdownSignal,
    force: CancellationToken,
    tasks: TaskTracker,
}

impl Connections {
    async fn accept_loop<L: Listener>(self, mut listener: L) {
        let stop = self.stop.clone().recv();
        tokio::pin!(stop);

        loop {
            let (io, _) = tokio::select! {
                accepted = listener.accept() => accepted,
                () = &mut stop => break,
            };
            self.tasks.spawn(serve_connection(
                io,
                self.router.clone(),
                self.stop.clone(),
                self.force.clone(),
            ));
        }

        drop(listener);
        self.tasks.close();
        tracing::debug!(connections = self.tasks.len(), "Stopped accepting");
        self.tasks.wait().await;
    }
}

async fn serve_connection<I>(io: I, router: Router, stop: ShutdownSignal, force: CancellationToken)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let first_request = CancellationToken::new();
    let service = {
        let first_request = first_request.clone();
        hyper::service::service_fn(move |request: Request<Incoming>| {
            first_request.cancel();
            router.clone().call(request)
        })
    };

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => return log_connection_end(result),
        () = stop.recv() => {}
        () = force.cancelled() => return,
    }

    // A connection accepted before the stop may still be carrying the
    // client's first request; closing it now would reset the client.
    tokio::select! {
        result = conn.as_mut() => return log_connection_end(result),
        () = first_request.cancelled() => {}
        () = tokio::time::sleep(FIRST_REQUEST_GRACE) => {}
        () = force.cancelled() => return,
    }

    conn.as_mut().graceful_shutdown();
    tokio::select! {
        result = conn.as_mut() => log_connection_end(result),
        () = force.cancelled() => {}
    }
}

fn log_connection_end(result: Result<(), Box<dyn std::error::Error + Send + Sync>>) {
    if let Err(e) = result {
        tracing::debug!(error = %e, "Connection closed with error");
    }
}

/// A running server; one per process incarnation.
pub struct ServerHandle {
    shutdown: Shutdown,
    force: CancellationToken,
    tracker: InFlightTracker,
    task: JoinHandle<()>,
    listener: String,
}

impl ServerHandle {
    /// Requests currently being served.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting and wait up to `timeout` for accepted connections.
    ///
    /// On timeout every remaining connection is dropped and its requests
    /// are abandoned.
    pub async fn drain(mut self, timeout: Duration) -> Result<(), DrainError> {
        self.shutdown.trigger();
        tracing::info!(
            listener = %self.listener,
            in_flight = self.tracker.active_count(),
            timeout_secs = timeout.as_secs_f64(),
            "Draining HTTP server"
        );

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {
                tracing::info!(listener = %self.listener, "HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(DrainError::Join(e)),
            Err(_) => {
                let remaining = self.tracker.active_count();
                self.force.cancel();
                self.task.abort();
                tracing::warn!(
                    listener = %self.listener,
                    remaining,
                    "Drain deadline passed, forcing stop"
                );
                Err(DrainError::Timeout { timeout, remaining })
            }
        }
    }
}
