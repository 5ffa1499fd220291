//! Mapping of storage errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            StoreError::Empty(_) | StoreError::EmptyBatch => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Batch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError(StoreError::Empty("key")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(StoreError::NotFound("k".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(StoreError::Batch(vec![])).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
