use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::pipeline::retrieve;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct DocumentRef {
    pub title: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
    pub heading_path: Vec<String>,
    pub chunk_index: usize,
    pub score: f32,
    pub document: DocumentRef,
}

fn validate(req: &SearchRequest) -> Result<(), ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }
    if req.k < 1 || req.k > 50 {
        return Err(ApiError::Validation("k must be between 1 and 50".to_string()));
    }
    Ok(())
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResultItem>>, ApiError> {
    validate(&req)?;

    let results = retrieve(&state, &req.query, req.k).await?;

    let mut items = Vec::with_capacity(results.len());
    for chunk in results {
        let (title, path) = match state.doc_store.get(&chunk.doc_id)? {
            Some(row) => (row.title, row.path),
            None => (chunk.doc_id.clone(), String::new()),
        };
        items.push(SearchResultItem {
            chunk_id: chunk.chunk_id,
            doc_id: chunk.doc_id,
            content: chunk.content,
            heading_path: chunk.heading_path,
            chunk_index: chunk.chunk_index,
            score: chunk.score,
            document: DocumentRef { title, path },
        });
    }
    Ok(Json(items))
}
