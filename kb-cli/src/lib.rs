//! Shared wiring for the `kb-index` and `kb-serve` binaries: build an
//! [`kb_api::config::AppConfig`] from the process environment and
//! construct the concrete store/provider implementations it describes
//! (§5 "deps/factory").

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use kb_api::config::{expand_env, AppConfig, ChunkingConfig, EmbeddingConfig, LlmConfig, RateLimitConfig, RetrievalConfig};
use kb_chunker::ChunkerConfig;
use kb_model::{table_name_for_model, IndexSignatureInputs};
use kb_providers::{ChatModel, Embedder, FakeChatModel, FakeEmbedder, HttpChatConfig, HttpChatModel, HttpEmbedder, HttpEmbedderConfig};
use kb_store::{DocStore, SqliteDocStore, SqliteVectorStore, VectorStore};
use rusqlite::Connection;

fn env_snapshot() -> HashMap<String, String> {
    env::vars().collect()
}

fn env_var(env: &HashMap<String, String>, key: &str, default: &str) -> String {
    expand_env(&format!("${{{key}:-{default}}}"), env)
}

fn env_usize(env: &HashMap<String, String>, key: &str, default: usize) -> usize {
    env_var(env, key, &default.to_string()).parse().unwrap_or(default)
}

fn env_f32(env: &HashMap<String, String>, key: &str, default: f32) -> f32 {
    env_var(env, key, &default.to_string()).parse().unwrap_or(default)
}

fn env_bool(env: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match env_var(env, key, &default.to_string()).as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => default,
    }
}

/// Read every recognized `KB_*` environment variable into an [`AppConfig`],
/// falling back to the documented defaults for anything unset.
pub fn load_config() -> AppConfig {
    let env = env_snapshot();

    let database_url = env_var(&env, "KB_DATABASE_URL", "kb.sqlite3");
    let vector_table_name = env.get("KB_VECTOR_TABLE_NAME").cloned();

    let chunking = ChunkingConfig {
        max_section_chars: env_usize(&env, "KB_MAX_SECTION_CHARS", 2000),
        chunk_size: env_usize(&env, "KB_CHUNK_SIZE", 500),
        chunk_overlap: env_usize(&env, "KB_CHUNK_OVERLAP", 80),
    };

    let embedding = EmbeddingConfig {
        provider: env_var(&env, "KB_EMBEDDING_PROVIDER", "http"),
        model: env_var(&env, "KB_EMBEDDING_MODEL", ""),
        batch_size: env_usize(&env, "KB_EMBEDDING_BATCH_SIZE", 32),
        endpoint: env_var(&env, "KB_EMBEDDING_ENDPOINT", ""),
        api_key: env.get("KB_EMBEDDING_API_KEY").cloned(),
    };

    let llm = LlmConfig {
        model: env_var(&env, "KB_LLM_MODEL", ""),
        temperature: env_f32(&env, "KB_LLM_TEMPERATURE", 0.2),
        max_tokens: env_usize(&env, "KB_LLM_MAX_TOKENS", 1024) as u32,
        endpoint: env_var(&env, "KB_LLM_ENDPOINT", ""),
        api_key: env.get("KB_LLM_API_KEY").cloned(),
        streaming: env_bool(&env, "KB_LLM_STREAMING", false),
    };

    let retrieval = RetrievalConfig {
        score_threshold: env_f32(&env, "KB_SCORE_THRESHOLD", 0.7),
        max_chunks_per_doc: env_usize(&env, "KB_MAX_CHUNKS_PER_DOC", 3),
        use_hybrid: env_bool(&env, "KB_USE_HYBRID", true),
        use_reranking: env_bool(&env, "KB_USE_RERANKING", true),
        hybrid_alpha: env_f32(&env, "KB_HYBRID_ALPHA", 0.7),
    };

    let rate_limit = RateLimitConfig {
        global_per_day: env_usize(&env, "KB_RATE_LIMIT_GLOBAL_PER_DAY", 10_000) as u32,
        per_ip_per_day: env_usize(&env, "KB_RATE_LIMIT_PER_IP_PER_DAY", 50) as u32,
    };

    AppConfig {
        database_url,
        vector_table_name,
        chunking,
        embedding,
        llm,
        retrieval,
        rate_limit,
        db_connect_timeout: Duration::from_secs(2),
    }
}

fn open_connection(database_url: &str) -> Connection {
    if database_url.trim().is_empty() || database_url == ":memory:" {
        Connection::open_in_memory().expect("open in-memory sqlite connection")
    } else {
        Connection::open(database_url).unwrap_or_else(|err| panic!("open sqlite database {database_url}: {err}"))
    }
}

/// Build the embedder the configuration describes. Falls back to
/// [`FakeEmbedder`] when no endpoint is configured, so the binaries run
/// offline without a reachable provider.
pub async fn build_embedder(config: &AppConfig) -> Arc<dyn Embedder> {
    if config.embedding.endpoint.trim().is_empty() {
        tracing::warn!("no embedding endpoint configured, using the deterministic fake embedder");
        return Arc::new(FakeEmbedder::new(384));
    }
    let http_config = HttpEmbedderConfig {
        endpoint: config.embedding.endpoint.clone(),
        api_key: config.embedding.api_key.clone(),
        model: config.embedding.model.clone(),
        batch_size: config.embedding.batch_size,
        timeout: Duration::from_secs(60),
        max_retries: 5,
    };
    match HttpEmbedder::connect(http_config).await {
        Ok(embedder) => Arc::new(embedder),
        Err(err) => {
            tracing::error!(%err, "failed to connect to embedding provider, falling back to the fake embedder");
            Arc::new(FakeEmbedder::new(384))
        }
    }
}

/// Build the chat model the configuration describes, falling back to
/// [`FakeChatModel`] when no endpoint is configured.
pub fn build_chat_model(config: &AppConfig) -> Arc<dyn ChatModel> {
    if config.llm.endpoint.trim().is_empty() {
        tracing::warn!("no chat endpoint configured, using the deterministic fake chat model");
        return Arc::new(FakeChatModel::new(true));
    }
    let http_config = HttpChatConfig {
        endpoint: config.llm.endpoint.clone(),
        api_key: config.llm.api_key.clone(),
        model: config.llm.model.clone(),
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
        timeout: Duration::from_secs(60),
        max_retries: 5,
        streaming: config.llm.streaming,
    };
    match HttpChatModel::new(http_config) {
        Ok(model) => Arc::new(model),
        Err(err) => {
            tracing::error!(%err, "failed to build chat model client, falling back to the fake chat model");
            Arc::new(FakeChatModel::new(true))
        }
    }
}

/// Open the document store and vector store described by `config`, sized
/// to `embedding_dimension`. The vector table name is derived from the
/// embedding model identifier unless overridden.
pub fn open_stores(config: &AppConfig, embedding_dimension: usize) -> (Arc<dyn DocStore>, Arc<dyn VectorStore>) {
    let doc_conn = open_connection(&config.database_url);
    let doc_store = Arc::new(SqliteDocStore::open(doc_conn).expect("open document store"));

    let table_name = config
        .vector_table_name
        .clone()
        .unwrap_or_else(|| table_name_for_model(&config.embedding.model));
    let vector_conn = open_connection(&config.database_url);
    let vector_store = Arc::new(
        SqliteVectorStore::open(vector_conn, &table_name, embedding_dimension).expect("open vector store"),
    );

    (doc_store, vector_store)
}

/// Build the signature inputs the incremental indexer gates on, matching
/// `config`'s chunking and embedding parameters exactly (§3 "index
/// signature").
pub fn signature_inputs(config: &AppConfig, embedding_dimension: usize, table_name: &str) -> IndexSignatureInputs {
    IndexSignatureInputs {
        embedding_model: config.embedding.model.clone(),
        embedding_dim: embedding_dimension,
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        max_section_chars: config.chunking.max_section_chars,
        table_name: table_name.to_string(),
    }
}

pub fn chunker_config(config: &AppConfig) -> ChunkerConfig {
    ChunkerConfig {
        max_section_chars: config.chunking.max_section_chars,
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
    }
}

/// Content roots used to turn a document path into a site route (§4.9
/// "citation construction"). Configurable as a comma-separated list.
pub fn content_roots() -> Vec<String> {
    env::var("KB_CONTENT_ROOTS")
        .ok()
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|| vec!["docs".to_string(), "content".to_string()])
}
