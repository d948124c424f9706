use std::collections::HashMap;

use kb_store::FusedChunk;

use crate::reranker::{RankedChunk, ReRanker};

/// A retrieved chunk enriched with a citation number, ready to hand to a
/// prompt builder or an HTTP response (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
    pub heading_path: Vec<String>,
    pub chunk_index: usize,
    pub score: f32,
    pub citation_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverConfig {
    pub score_threshold: f32,
    pub max_chunks_per_doc: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            max_chunks_per_doc: 3,
        }
    }
}

/// Filters, deduplicates, and cites a fused (and optionally re-ranked)
/// result set. The threshold is always applied to the *semantic* score
/// (§9 Open Question 3), regardless of whether re-ranking or hybrid fusion
/// changed the ordering score.
pub struct Retriever {
    config: RetrieverConfig,
    reranker: Option<ReRanker>,
}

impl Retriever {
    pub fn new(config: RetrieverConfig, reranker: Option<ReRanker>) -> Self {
        Self { config, reranker }
    }

    /// Build the final retrieval result from a fused candidate list and the
    /// query that produced it.
    pub fn finalize(&self, fused: Vec<FusedChunk>, query: &str) -> Vec<RetrievedChunk> {
        let ranked: Vec<RankedChunk> = match &self.reranker {
            Some(reranker) => reranker.rerank(&fused, query),
            None => fused
                .into_iter()
                .map(|f| {
                    let score = f.rrf_score;
                    RankedChunk { fused: f, score }
                })
                .collect(),
        };

        let filtered: Vec<RankedChunk> = ranked
            .into_iter()
            .filter(|r| r.fused.semantic_score.unwrap_or(0.0) >= self.config.score_threshold)
            .collect();

        if filtered.is_empty() {
            return Vec::new();
        }

        let mut sorted = filtered;
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fused.chunk.chunk_id.cmp(&b.fused.chunk.chunk_id))
        });

        let mut per_doc: HashMap<String, usize> = HashMap::new();
        let mut deduped: Vec<RankedChunk> = Vec::new();
        for r in sorted {
            let count = per_doc.entry(r.fused.chunk.doc_id.clone()).or_insert(0);
            if *count < self.config.max_chunks_per_doc {
                *count += 1;
                deduped.push(r);
            }
        }

        deduped.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fused.chunk.chunk_id.cmp(&b.fused.chunk.chunk_id))
        });

        deduped
            .into_iter()
            .enumerate()
            .map(|(i, r)| RetrievedChunk {
                chunk_id: r.fused.chunk.chunk_id,
                doc_id: r.fused.chunk.doc_id,
                content: r.fused.chunk.content,
                heading_path: r.fused.chunk.heading_path,
                chunk_index: r.fused.chunk.chunk_index,
                score: r.score,
                citation_id: (i + 1) as u32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kb_model::ChunkRow;

    fn fused(id: &str, doc_id: &str, semantic: f32, rrf: f32) -> FusedChunk {
        FusedChunk {
            chunk: ChunkRow {
                chunk_id: id.into(),
                doc_id: doc_id.into(),
                content: "content".into(),
                heading_path: vec![],
                chunk_index: 0,
                embedding: vec![],
                created_at: Utc::now(),
            },
            rrf_score: rrf,
            semantic_score: Some(semantic),
            lexical_score: None,
        }
    }

    #[test]
    fn below_threshold_chunks_are_dropped() {
        let retriever = Retriever::new(RetrieverConfig::default(), None);
        let results = retriever.finalize(vec![fused("a", "d1", 0.5, 0.5)], "q");
        assert!(results.is_empty());
    }

    #[test]
    fn citation_ids_are_sequential_from_one() {
        let retriever = Retriever::new(RetrieverConfig::default(), None);
        let results = retriever.finalize(
            vec![fused("a", "d1", 0.9, 0.9), fused("b", "d2", 0.8, 0.8)],
            "q",
        );
        assert_eq!(results[0].citation_id, 1);
        assert_eq!(results[1].citation_id, 2);
    }

    #[test]
    fn caps_chunks_per_document() {
        let config = RetrieverConfig {
            score_threshold: 0.0,
            max_chunks_per_doc: 1,
        };
        let retriever = Retriever::new(config, None);
        let results = retriever.finalize(
            vec![fused("a", "d1", 0.9, 0.9), fused("b", "d1", 0.8, 0.8)],
            "q",
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
    }

    #[test]
    fn threshold_checks_semantic_score_not_rrf_score() {
        // rrf_score clears the bar but semantic_score does not: dropped.
        let config = RetrieverConfig {
            score_threshold: 0.7,
            max_chunks_per_doc: 3,
        };
        let retriever = Retriever::new(config, None);
        let results = retriever.finalize(vec![fused("a", "d1", 0.5, 0.95)], "q");
        assert!(results.is_empty());
    }
}
