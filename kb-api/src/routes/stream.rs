use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;

use crate::citations::build_citations;
use crate::pipeline::retrieve;
use crate::rate_limit::resolve_client_ip;
use crate::routes::ask::build_prompt;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub question: String,
    pub session_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub mode: Option<String>,
}

fn default_top_k() -> usize {
    5
}

fn validate(req: &StreamRequest) -> Result<(), String> {
    if req.question.trim().is_empty() {
        return Err("question must not be empty".to_string());
    }
    if req.session_id.trim().is_empty() {
        return Err("session_id must not be empty".to_string());
    }
    if req.top_k < 1 || req.top_k > 20 {
        return Err("top_k must be between 1 and 20".to_string());
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rate_limit_headers(decision: crate::rate_limit::RateLimitDecision, now_unix: i64) -> Vec<(&'static str, String)> {
    vec![
        ("Retry-After", (decision.reset_unix - now_unix).max(0).to_string()),
        ("X-RateLimit-Limit-Global", decision.global_limit.to_string()),
        ("X-RateLimit-Remaining-Global", decision.global_remaining.to_string()),
        ("X-RateLimit-Limit-IP", decision.ip_limit.to_string()),
        ("X-RateLimit-Remaining-IP", decision.ip_remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_unix.to_string()),
    ]
}

/// `POST /stream`: rate-limited SSE endpoint running retrieval then
/// generation, emitting the event sequence described in §4.9.
pub async fn stream(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<StreamRequest>,
) -> Response {
    if let Err(msg) = validate(&req) {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": msg }))).into_response();
    }

    let ip = resolve_client_ip(
        header_str(&headers, "cf-connecting-ip"),
        header_str(&headers, "x-real-ip"),
        header_str(&headers, "x-forwarded-for"),
        &peer.to_string(),
    );
    let now = chrono::Utc::now();
    let decision = state.rate_limiter.hit(&ip, now);

    if !decision.allowed {
        tracing::warn!(ip, "rate limit exceeded on /stream");
        let mut response =
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "detail": "rate limit exceeded" }))).into_response();
        let header_map = response.headers_mut();
        for (name, value) in rate_limit_headers(decision, now.timestamp()) {
            if let Ok(value) = HeaderValue::from_str(&value) {
                header_map.insert(name, value);
            }
        }
        return response;
    }

    Sse::new(event_stream(state, req)).into_response()
}

fn event_stream(state: AppState, req: StreamRequest) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(sse_event("start", json!({"status": "starting"})));
        yield Ok(sse_event("retrieval_start", json!({"status": "retrieving"})));

        let retrieval_start = Instant::now();
        let results = match retrieve(&state, &req.question, req.top_k).await {
            Ok(results) => results,
            Err(err) => {
                yield Ok(error_event(&err.to_string(), "retrieval failed"));
                return;
            }
        };
        let retrieval_time_ms = retrieval_start.elapsed().as_millis() as u64;

        let chunk_payloads: Vec<serde_json::Value> = results
            .iter()
            .map(|c| {
                json!({
                    "chunk_id": c.chunk_id,
                    "doc_id": c.doc_id,
                    "content": c.content,
                    "heading_path": c.heading_path,
                    "score": c.score,
                })
            })
            .collect();
        yield Ok(sse_event(
            "retrieval_complete",
            json!({ "chunks": chunk_payloads, "retrieval_time_ms": retrieval_time_ms }),
        ));

        yield Ok(sse_event("generation_start", json!({"status": "generating"})));

        let contexts: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        let prompt = build_prompt(&req.question, &contexts);

        let generation_start = Instant::now();
        let mut answer = String::new();
        let mut failed = false;

        if state.chat_model.supports_streaming() {
            match state.chat_model.generate_stream(&prompt).await {
                Ok(mut deltas) => {
                    while let Some(item) = deltas.next().await {
                        match item {
                            Ok(delta) => {
                                answer.push_str(&delta);
                                yield Ok(sse_event("generation_delta", json!({"delta": delta})));
                            }
                            Err(err) => {
                                yield Ok(error_event(&err.to_string(), "generation failed"));
                                failed = true;
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    yield Ok(error_event(&err.to_string(), "generation failed"));
                    failed = true;
                }
            }
        } else {
            match state.chat_model.generate(&prompt).await {
                Ok(full) => {
                    for word in full.split_whitespace() {
                        let delta = format!("{word} ");
                        answer.push_str(&delta);
                        yield Ok(sse_event("generation_delta", json!({"delta": delta})));
                        sleep(Duration::from_millis(20)).await;
                    }
                }
                Err(err) => {
                    yield Ok(error_event(&err.to_string(), "generation failed"));
                    failed = true;
                }
            }
        }

        if failed {
            return;
        }

        let generation_time_ms = generation_start.elapsed().as_millis() as u64;

        let citations = match build_citations(&results, state.doc_store.as_ref(), &state.content_roots) {
            Ok(citations) => citations,
            Err(err) => {
                yield Ok(error_event(&err.to_string(), "citation assembly failed"));
                return;
            }
        };
        let sources_count = citations.len();

        yield Ok(sse_event(
            "generation_complete",
            json!({
                "answer": answer,
                "citations": citations,
                "metadata": {
                    "agent_type": "knowledge_base",
                    "session_id": req.session_id,
                    "retrieval_time_ms": retrieval_time_ms,
                    "generation_time_ms": generation_time_ms,
                    "sources_count": sources_count,
                },
            }),
        ));

        yield Ok(sse_event("complete", json!({ "session_id": req.session_id })));
    }
}

fn sse_event(name: &'static str, payload: serde_json::Value) -> Event {
    Event::default().event(name).json_data(payload).expect("serialize sse payload")
}

fn error_event(detail: &str, summary: &str) -> Event {
    sse_event("error", json!({ "error": summary, "detail": detail }))
}
