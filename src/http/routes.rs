//! Default API routes: health and the key/value wrapper.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::response::ApiError;
use crate::store::{KvEntry, KvStore};

type SharedStore = Arc<dyn KvStore>;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub pattern: String,
    /// Comma-separated list of accepted values.
    #[serde(default)]
    pub keywords: Option<String>,
}

/// Build the API router over `store`.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/kv", get(search).post(set_batch))
        .route("/kv/{key}", get(get_key).put(set_key).delete(delete_key))
        .with_state(store)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "pid": std::process::id() }))
}

async fn get_key(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
) -> Result<String, ApiError> {
    Ok(store.get(&key)?)
}

async fn set_key(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
    value: String,
) -> Result<String, ApiError> {
    Ok(store.set(&key, &value)?)
}

async fn delete_key(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    match store.delete(&[key])? {
        0 => Ok(StatusCode::NOT_FOUND),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

async fn set_batch(
    State(store): State<SharedStore>,
    Json(entries): Json<Vec<KvEntry>>,
) -> Result<StatusCode, ApiError> {
    store.set_batch(&entries)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search(
    State(store): State<SharedStore>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<KvEntry>>, ApiError> {
    let keywords: Vec<String> = params
        .keywords
        .as_deref()
        .map(|k| {
            k.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(store.search(&params.pattern, &keywords)?))
}
