use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub endpoints: serde_json::Value,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "knowledge base retrieval service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: json!({
            "health": "/health",
            "ready": "/ready",
            "search": "/search",
            "ask": "/ask",
            "stream": "/stream",
        }),
    })
}
