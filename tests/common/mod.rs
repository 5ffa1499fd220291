//! Shared utilities for integration tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use dragonfly::config::AppConfig;
use dragonfly::http::{HttpServer, ServerHandle};
use dragonfly::net::{create_listener, ListenerHandle};

/// HTTP client that opens a fresh connection for every request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Router with `/health` and a `/slow` route that answers after `delay`.
pub fn test_router(delay: Duration) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({ "status": "ok", "pid": std::process::id() })) }),
        )
        .route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
}

/// Bind `address` and serve `router` on it.
#[allow(dead_code)]
pub fn start_server(
    config: &AppConfig,
    address: &str,
    router: Router,
) -> (Arc<ListenerHandle>, ServerHandle) {
    let listener = Arc::new(create_listener(address).unwrap());
    let server = HttpServer::new(config, router).serve(&listener).unwrap();
    (listener, server)
}

/// Poll `check` every 20ms until it returns true or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// PID reported by `GET {base}/health`, if the server answers.
#[allow(dead_code)]
pub async fn health_pid(client: &reqwest::Client, base: &str) -> Option<u32> {
    let res = client.get(format!("{base}/health")).send().await.ok()?;
    if !res.status().is_success() {
        return None;
    }
    let body: Value = res.json().await.ok()?;
    body["pid"].as_u64().map(|pid| pid as u32)
}
