use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The API's public error surface, per §7's behavioral taxonomy:
/// validation failures are 422, precondition failures 503, everything
/// else that reaches a handler unhandled is 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("service not ready: {0}")]
    NotReady(String),

    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::NotReady(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Backend(msg) => {
                tracing::error!(detail = %msg, "request failed with a backend error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<kb_store::StoreError> for ApiError {
    fn from(err: kb_store::StoreError) -> Self {
        ApiError::Backend(err.to_string())
    }
}

impl From<kb_providers::EmbeddingError> for ApiError {
    fn from(err: kb_providers::EmbeddingError) -> Self {
        match err {
            kb_providers::EmbeddingError::InvalidConfiguration { .. } => ApiError::NotReady(err.to_string()),
            other => ApiError::Backend(other.to_string()),
        }
    }
}

impl From<kb_providers::ChatError> for ApiError {
    fn from(err: kb_providers::ChatError) -> Self {
        match err {
            kb_providers::ChatError::InvalidConfiguration { .. } => ApiError::NotReady(err.to_string()),
            other => ApiError::Backend(other.to_string()),
        }
    }
}
