use kb_model::ChunkRow;

use crate::vector_store::ScoredChunk;

/// A chunk's fused rank, carrying the RRF score used for ordering plus the
/// original per-list scores so callers (the re-ranker, citation assembly)
/// can still see where relevance came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedChunk {
    pub chunk: ChunkRow,
    pub rrf_score: f32,
    pub semantic_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Reciprocal Rank Fusion parameters (§4.5): `score = alpha / (k + rank_sem)
/// + (1 - alpha) / (k + rank_lex)`, summed over whichever lists contain a
/// chunk. A chunk present in only one list is scored from that list alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfConfig {
    pub alpha: f32,
    pub k: f32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { alpha: 0.7, k: 60.0 }
    }
}

/// Fuse a semantic and a lexical ranked list into one ordering, truncated to
/// `top_k` (§4.5: "Output: a fused ranked list of length <= k"). Ranks are
/// 1-based positions within each input list; a chunk absent from a list
/// contributes nothing from that list's term. The fallback lexical backend
/// (substring scoring) participates identically to a full-text backend —
/// RRF consumes rank, not raw score, so the two are interchangeable here.
pub fn reciprocal_rank_fusion(
    semantic: &[ScoredChunk],
    lexical: &[ScoredChunk],
    config: RrfConfig,
    top_k: usize,
) -> Vec<FusedChunk> {
    use std::collections::HashMap;

    struct Entry {
        chunk: ChunkRow,
        rrf_score: f32,
        semantic_score: Option<f32>,
        lexical_score: Option<f32>,
    }

    let mut entries: HashMap<String, Entry> = HashMap::new();

    for (rank, scored) in semantic.iter().enumerate() {
        let rank = (rank + 1) as f32;
        let contribution = config.alpha / (config.k + rank);
        let entry = entries.entry(scored.chunk.chunk_id.clone()).or_insert_with(|| Entry {
            chunk: scored.chunk.clone(),
            rrf_score: 0.0,
            semantic_score: None,
            lexical_score: None,
        });
        entry.rrf_score += contribution;
        entry.semantic_score = Some(scored.score);
    }

    for (rank, scored) in lexical.iter().enumerate() {
        let rank = (rank + 1) as f32;
        let contribution = (1.0 - config.alpha) / (config.k + rank);
        let entry = entries.entry(scored.chunk.chunk_id.clone()).or_insert_with(|| Entry {
            chunk: scored.chunk.clone(),
            rrf_score: 0.0,
            semantic_score: None,
            lexical_score: None,
        });
        entry.rrf_score += contribution;
        entry.lexical_score = Some(scored.score);
    }

    let mut fused: Vec<FusedChunk> = entries
        .into_values()
        .map(|e| FusedChunk {
            chunk: e.chunk,
            rrf_score: e.rrf_score,
            semantic_score: e.semantic_score,
            lexical_score: e.lexical_score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    fused.truncate(top_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(id: &str) -> ChunkRow {
        ChunkRow {
            chunk_id: id.into(),
            doc_id: "d1".into(),
            content: id.into(),
            heading_path: vec![],
            chunk_index: 0,
            embedding: vec![],
            created_at: Utc::now(),
        }
    }

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk { chunk: chunk(id), score }
    }

    #[test]
    fn top_of_both_lists_outranks_single_list_hit() {
        let semantic = vec![scored("a", 0.9), scored("b", 0.5)];
        let lexical = vec![scored("a", 1.0), scored("c", 0.8)];
        let fused = reciprocal_rank_fusion(&semantic, &lexical, RrfConfig::default(), 10);
        assert_eq!(fused[0].chunk.chunk_id, "a");
        assert!(fused[0].semantic_score.is_some());
        assert!(fused[0].lexical_score.is_some());
    }

    #[test]
    fn chunk_in_one_list_only_still_scores() {
        let semantic = vec![scored("a", 0.9)];
        let lexical: Vec<ScoredChunk> = vec![];
        let fused = reciprocal_rank_fusion(&semantic, &lexical, RrfConfig::default(), 10);
        assert_eq!(fused.len(), 1);
        assert!(fused[0].rrf_score > 0.0);
        assert_eq!(fused[0].lexical_score, None);
    }

    #[test]
    fn empty_lists_fuse_to_empty() {
        let fused = reciprocal_rank_fusion(&[], &[], RrfConfig::default(), 10);
        assert!(fused.is_empty());
    }

    #[test]
    fn ties_broken_by_chunk_id() {
        let semantic = vec![scored("b", 0.5), scored("a", 0.5)];
        let fused = reciprocal_rank_fusion(&semantic, &[], RrfConfig::default(), 10);
        // both ranked identically within the list (rank 1 vs 2), so scores differ;
        // use two independent single-entry lists to force an exact tie instead.
        let fused_b_only = reciprocal_rank_fusion(&[scored("b", 0.5)], &[], RrfConfig::default(), 10);
        let fused_a_only = reciprocal_rank_fusion(&[scored("a", 0.5)], &[], RrfConfig::default(), 10);
        assert_eq!(fused_b_only[0].rrf_score, fused_a_only[0].rrf_score);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn disjoint_lists_are_truncated_to_top_k() {
        let semantic = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let lexical = vec![scored("d", 0.9), scored("e", 0.8), scored("f", 0.7)];
        let fused = reciprocal_rank_fusion(&semantic, &lexical, RrfConfig::default(), 3);
        assert_eq!(fused.len(), 3);
    }
}
