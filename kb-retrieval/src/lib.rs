//! Heuristic re-ranking and retrieval orchestration (§4.7, §4.8): turns a
//! fused candidate list into the threshold-filtered, deduplicated,
//! cited list a prompt builder or HTTP response consumes.

pub mod reranker;
pub mod retriever;

pub use reranker::{RankedChunk, ReRanker, ReRankerConfig};
pub use retriever::{RetrievedChunk, Retriever, RetrieverConfig};
