//! HTTP surface: request validation, the shared retrieval pipeline, and
//! the SSE streaming endpoint, all closing over one [`state::AppState`]
//! (§4.9, §6).

pub mod citations;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the full router: routes plus tracing and permissive CORS, matching
/// a public read-heavy API with no session cookies to protect.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root::root))
        .route("/health", get(routes::health::health))
        .route("/ready", get(routes::health::ready))
        .route("/search", post(routes::search::search))
        .route("/ask", post(routes::ask::ask))
        .route("/stream", post(routes::stream::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
