use kb_retrieval::RetrievedChunk;
use kb_store::{reciprocal_rank_fusion, FusedChunk, ScoredChunk};

use crate::error::ApiError;
use crate::state::AppState;

/// Embed the query, run semantic (and lexical, if hybrid is enabled)
/// search, fuse, and hand the candidate list to the retriever (§4.7 step
/// 1-2). Shared by `/search`, `/ask`, and `/stream` so all three endpoints
/// use one retrieval code path.
pub async fn retrieve(state: &AppState, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
    let query_vector = state.embedder.embed_query(query).await?;
    let semantic = state.vector_store.search_semantic(&query_vector, top_k)?;

    let fused: Vec<FusedChunk> = if state.use_hybrid() {
        let lexical = state.vector_store.search_lexical(query, top_k)?;
        reciprocal_rank_fusion(&semantic, &lexical, state.rrf, top_k)
    } else {
        semantic_only(semantic)
    };

    Ok(state.retriever.finalize(fused, query))
}

fn semantic_only(semantic: Vec<ScoredChunk>) -> Vec<FusedChunk> {
    semantic
        .into_iter()
        .map(|s| FusedChunk {
            chunk: s.chunk,
            rrf_score: s.score,
            semantic_score: Some(s.score),
            lexical_score: None,
        })
        .collect()
}
