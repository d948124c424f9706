use std::sync::Arc;

use kb_providers::{ChatModel, Embedder};
use kb_retrieval::{ReRanker, ReRankerConfig, Retriever, RetrieverConfig};
use kb_store::{DocStore, RrfConfig, VectorStore};

use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;

/// The dependency container every handler closes over (§5 "deps/factory"):
/// one instance per process, built once at startup from [`AppConfig`] and
/// shared across requests behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub doc_store: Arc<dyn DocStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub chat_model: Arc<dyn ChatModel>,
    pub retriever: Arc<Retriever>,
    pub rrf: RrfConfig,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<AppConfig>,
    pub content_roots: Vec<String>,
}

impl AppState {
    pub fn new(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
        config: AppConfig,
        content_roots: Vec<String>,
    ) -> Self {
        let reranker = if config.retrieval.use_reranking {
            Some(ReRanker::new(ReRankerConfig::default()))
        } else {
            None
        };
        let retriever = Retriever::new(
            RetrieverConfig {
                score_threshold: config.retrieval.score_threshold,
                max_chunks_per_doc: config.retrieval.max_chunks_per_doc,
            },
            reranker,
        );
        let rate_limiter = RateLimiter::new(config.rate_limit);
        Self {
            doc_store,
            vector_store,
            embedder,
            chat_model,
            retriever: Arc::new(retriever),
            rrf: RrfConfig {
                alpha: config.retrieval.hybrid_alpha,
                ..RrfConfig::default()
            },
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
            content_roots,
        }
    }

    pub fn use_hybrid(&self) -> bool {
        self.config.retrieval.use_hybrid
    }
}
