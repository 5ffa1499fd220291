//! Per-request middleware.
//!
//! # Responsibilities
//! - Assign and propagate `x-request-id`
//! - Apply the global CORS policy
//! - Register each request with the in-flight tracker used by drain
//! - Shed load above the configured in-flight limit
//! - Record request metrics

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::net::InFlightTracker;
use crate::observability::metrics;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that assigns a UUID request ID when the client did not send one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Browser access from any origin, credentials included.
///
/// The request's `Origin` is echoed back, since a wildcard origin cannot be
/// combined with credentials.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([header::ACCEPT, header::CONTENT_TYPE, header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(3600))
}

/// State for [`track_in_flight`].
#[derive(Debug, Clone)]
pub struct InFlightState {
    pub tracker: InFlightTracker,
    pub max_in_flight: u64,
}

/// Keep the request counted as in flight until its response is produced.
pub async fn track_in_flight(
    State(state): State<InFlightState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let guard = state.tracker.track();
    let method = request.method().clone();
    let in_flight = state.tracker.active_count();

    if in_flight > state.max_in_flight {
        tracing::warn!(in_flight, limit = state.max_in_flight, "In-flight limit reached");
        metrics::record_request(method.as_str(), StatusCode::SERVICE_UNAVAILABLE.as_u16());
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is busy").into_response();
    }

    tracing::debug!(
        request = %guard.id(),
        method = %method,
        path = %request.uri().path(),
        in_flight,
        "Handling request"
    );

    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16());
    drop(guard);
    response
}
