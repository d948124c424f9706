use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::citations::{build_citations, Citation};
use crate::error::ApiError;
use crate::pipeline::retrieve;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub has_sufficient_knowledge: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    pub retrieval_time_ms: u64,
    pub generation_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

fn validate(req: &AskRequest) -> Result<(), ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::Validation("question must not be empty".to_string()));
    }
    if req.top_k < 1 || req.top_k > 50 {
        return Err(ApiError::Validation("top_k must be between 1 and 50".to_string()));
    }
    Ok(())
}

pub fn build_prompt(question: &str, contexts: &[&str]) -> String {
    if contexts.is_empty() {
        return format!(
            "No relevant context was found in the knowledge base.\n\nQuestion: {question}\n\nAnswer honestly that you do not have enough information."
        );
    }
    let joined = contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {c}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Context:\n{joined}\n\nQuestion: {question}\n\nAnswer using only the context above, citing sources by their bracket number.")
}

pub async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
    validate(&req)?;

    let retrieval_start = Instant::now();
    let results = retrieve(&state, &req.question, req.top_k).await?;
    let retrieval_time_ms = retrieval_start.elapsed().as_millis() as u64;

    let has_sufficient_knowledge = !results.is_empty();
    let contexts: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    let prompt = build_prompt(&req.question, &contexts);

    let generation_start = Instant::now();
    let answer = state.chat_model.generate(&prompt).await?;
    let generation_time_ms = generation_start.elapsed().as_millis() as u64;

    let citations = build_citations(&results, state.doc_store.as_ref(), &state.content_roots)?;

    Ok(Json(AskResponse {
        answer,
        citations,
        has_sufficient_knowledge,
        model: state.chat_model.model_name().to_string(),
        tokens_used: None,
        retrieval_time_ms,
        generation_time_ms,
        agent_type: Some("knowledge_base".to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_question() {
        let req = AskRequest { question: "   ".to_string(), top_k: 5 };
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let req = AskRequest { question: "hi".to_string(), top_k: 51 };
        assert!(validate(&req).is_err());
    }

    #[test]
    fn prompt_without_context_asks_for_honesty() {
        let prompt = build_prompt("what is rust?", &[]);
        assert!(prompt.contains("do not have enough information"));
    }

    #[test]
    fn prompt_with_context_numbers_sources() {
        let prompt = build_prompt("what is rust?", &["rust is a language"]);
        assert!(prompt.contains("[1] rust is a language"));
    }
}
