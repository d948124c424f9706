use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: always 200, reporting whether the database connection
/// backing the doc store is reachable.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.doc_store.get_index_signature() {
        Ok(_) => Json(json!({ "status": "healthy" })),
        Err(err) => Json(json!({
            "status": "degraded",
            "startup_errors": [err.to_string()],
        })),
    }
}

/// `GET /ready`: 503 when the database is unreachable, 200 otherwise.
pub async fn ready(State(state): State<AppState>) -> Response {
    if state.config.database_url.trim().is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": "database_url is not configured" })),
        )
            .into_response();
    }
    match state.doc_store.get_index_signature() {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": err.to_string() })),
        )
            .into_response(),
    }
}
