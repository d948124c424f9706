use std::collections::HashMap;

use kb_store::FusedChunk;

/// Weights for the heuristic re-ranker (§4.8): deterministic, no model
/// call, tuned so no single signal can dominate the fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReRankerConfig {
    pub exact_match_boost: f32,
    pub heading_boost: f32,
    pub diversity_penalty: f32,
    pub term_freq_weight: f32,
}

impl Default for ReRankerConfig {
    fn default() -> Self {
        Self {
            exact_match_boost: 0.15,
            heading_boost: 0.10,
            diversity_penalty: 0.05,
            term_freq_weight: 0.05,
        }
    }
}

/// A fused chunk after heuristic re-ranking: `score` is the new effective
/// ranking score, `rrf_score`/`semantic_score`/`lexical_score` are carried
/// through unchanged for citation enrichment and threshold filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub fused: FusedChunk,
    pub score: f32,
}

pub struct ReRanker {
    config: ReRankerConfig,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as", "how", "what", "where", "when", "why", "who",
    "which", "that",
];

impl ReRanker {
    pub fn new(config: ReRankerConfig) -> Self {
        Self { config }
    }

    /// Boost/penalize `results` (already scored by RRF) against `query`,
    /// returning a new ordering. `results` need not be pre-sorted.
    pub fn rerank(&self, results: &[FusedChunk], query: &str) -> Vec<RankedChunk> {
        if results.is_empty() {
            return Vec::new();
        }

        let query_lower = query.to_lowercase();
        let query_terms = extract_terms(query);

        let mut doc_occurrences: HashMap<&str, usize> = HashMap::new();
        for r in results {
            *doc_occurrences.entry(r.chunk.doc_id.as_str()).or_insert(0) += 1;
        }

        let mut ranked: Vec<RankedChunk> = results
            .iter()
            .map(|fused| {
                let base_score = fused.rrf_score;
                let content_lower = fused.chunk.content.to_lowercase();

                let mut adjustment = 0.0f32;

                let exact_matches = count_occurrences(&content_lower, &query_lower);
                if exact_matches > 0 {
                    adjustment += self.config.exact_match_boost * (exact_matches.min(3) as f32) / 3.0;
                }

                adjustment += heading_boost(&query_terms, &fused.chunk.heading_path, self.config.heading_boost);
                adjustment += term_frequency_score(&query_terms, &content_lower) * self.config.term_freq_weight;

                let mut score = (base_score + adjustment).clamp(0.0, 1.0);

                let occurrences = *doc_occurrences.get(fused.chunk.doc_id.as_str()).unwrap_or(&1);
                if occurrences > 1 {
                    let penalty = self.config.diversity_penalty * (occurrences - 1) as f32;
                    score = (score - penalty).max(0.0);
                }

                RankedChunk { fused: fused.clone(), score }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fused.chunk.chunk_id.cmp(&b.fused.chunk.chunk_id))
        });
        ranked
    }
}

fn extract_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Python `str.count`-style non-overlapping substring occurrence count.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        start += pos + needle.len();
    }
    count
}

fn heading_boost(query_terms: &[String], heading_path: &[String], weight: f32) -> f32 {
    if heading_path.is_empty() || query_terms.is_empty() {
        return 0.0;
    }
    let heading_text = heading_path.join(" ").to_lowercase();
    let matches = query_terms.iter().filter(|t| heading_text.contains(t.as_str())).count();
    if matches == 0 {
        return 0.0;
    }
    weight * (matches as f32 / query_terms.len() as f32).min(1.0)
}

fn term_frequency_score(query_terms: &[String], content_lower: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let counts: Vec<usize> = query_terms.iter().map(|t| count_occurrences(content_lower, t)).collect();
    let terms_found = counts.iter().filter(|&&c| c > 0).count();
    if terms_found == 0 {
        return 0.0;
    }
    let total_occurrences: usize = counts.iter().sum();
    let occurrence_bonus = (total_occurrences as f32 / (query_terms.len() as f32 * 2.0)).min(0.5);
    (terms_found as f32 / query_terms.len() as f32) * 0.5 + occurrence_bonus * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kb_model::ChunkRow;

    fn fused(id: &str, doc_id: &str, content: &str, heading_path: Vec<String>, rrf_score: f32) -> FusedChunk {
        FusedChunk {
            chunk: ChunkRow {
                chunk_id: id.into(),
                doc_id: doc_id.into(),
                content: content.into(),
                heading_path,
                chunk_index: 0,
                embedding: vec![],
                created_at: Utc::now(),
            },
            rrf_score,
            semantic_score: Some(rrf_score),
            lexical_score: None,
        }
    }

    #[test]
    fn empty_input_reranks_to_empty() {
        let reranker = ReRanker::new(ReRankerConfig::default());
        assert!(reranker.rerank(&[], "query").is_empty());
    }

    #[test]
    fn exact_match_boosts_score() {
        let reranker = ReRanker::new(ReRankerConfig::default());
        let with_match = fused("a", "d1", "rust programming guide", vec![], 0.5);
        let without_match = fused("b", "d2", "unrelated content here", vec![], 0.5);
        let ranked = reranker.rerank(&[with_match, without_match], "rust programming");
        assert_eq!(ranked[0].fused.chunk.chunk_id, "a");
        assert!(ranked[0].score > 0.5);
    }

    #[test]
    fn heading_match_boosts_score() {
        let reranker = ReRanker::new(ReRankerConfig::default());
        let with_heading = fused("a", "d1", "generic text", vec!["Rust Basics".into()], 0.5);
        let ranked = reranker.rerank(&[with_heading], "rust");
        assert!(ranked[0].score > 0.5);
    }

    #[test]
    fn repeated_doc_incurs_diversity_penalty() {
        let reranker = ReRanker::new(ReRankerConfig::default());
        let a = fused("a", "d1", "x", vec![], 0.6);
        let b = fused("b", "d1", "y", vec![], 0.6);
        let ranked = reranker.rerank(&[a, b], "irrelevant query");
        assert!(ranked.iter().all(|r| r.score < 0.6));
    }
}
