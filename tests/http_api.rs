//! Key/value routes and middleware over a real socket.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use dragonfly::config::AppConfig;
use dragonfly::http::{routes, X_REQUEST_ID};
use dragonfly::store::{KvStore, MemoryStore};

mod common;

#[tokio::test]
async fn key_value_routes() {
    let base = "http://127.0.0.1:28331";
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let (_listener, server) = common::start_server(
        &AppConfig::default(),
        "127.0.0.1:28331",
        routes::router(store),
    );
    let client = common::client();

    let res = client
        .put(format!("{base}/kv/user:1"))
        .body("alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key(X_REQUEST_ID));

    let res = client
        .post(format!("{base}/kv"))
        .json(&json!([
            { "key": "user:2", "value": "bob" },
            { "key": "session:9", "value": "alice" }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = client.get(format!("{base}/kv/user:1")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "alice");

    let found: Value = client
        .get(format!("{base}/kv?pattern=user:*"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        found,
        json!([
            { "key": "user:1", "value": "alice" },
            { "key": "user:2", "value": "bob" }
        ])
    );

    let found: Value = client
        .get(format!("{base}/kv?pattern=*&keywords=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found.as_array().unwrap().len(), 2);

    let res = client.delete(format!("{base}/kv/user:1")).send().await.unwrap();
    assert_eq!(res.status(), 204);
    let res = client.delete(format!("{base}/kv/user:1")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(format!("{base}/kv/user:1")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("user:1"));

    let res = client
        .put(format!("{base}/kv/user:3"))
        .body("  ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .post(format!("{base}/kv"))
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    server.drain(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn requests_above_limit_are_shed() {
    let mut config = AppConfig::default();
    config.listener.max_in_flight = 1;
    let (_listener, server) = common::start_server(
        &config,
        "127.0.0.1:28332",
        common::test_router(Duration::from_millis(500)),
    );
    let client = common::client();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.get("http://127.0.0.1:28332/slow").send().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.in_flight(), 1);

    let res = client
        .get("http://127.0.0.1:28332/health")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);

    assert_eq!(slow.await.unwrap().unwrap().status(), 200);
    assert_eq!(server.in_flight(), 0);
    server.drain(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn cross_origin_preflight_is_allowed() {
    let base = "http://127.0.0.1:28333";
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let (_listener, server) = common::start_server(
        &AppConfig::default(),
        "127.0.0.1:28333",
        routes::router(store),
    );
    let client = common::client();
    let origin = "https://app.example.com";

    let res = client
        .request(reqwest::Method::OPTIONS, format!("{base}/kv/user:1"))
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "PUT")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let headers = res.headers();
    assert_eq!(headers["access-control-allow-origin"], origin);
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-max-age"], "3600");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("PUT") && methods.contains("DELETE"), "{methods}");

    let res = client
        .get(format!("{base}/health"))
        .header("Origin", origin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], origin);

    server.drain(Duration::from_secs(2)).await.unwrap();
}
