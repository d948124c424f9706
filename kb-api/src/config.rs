use std::collections::HashMap;
use std::time::Duration;

/// Chunking parameters, mirrored from `kb_chunker::ChunkerConfig` so this
/// crate does not need a direct dependency on the chunker for config
/// plumbing alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    pub max_section_chars: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_section_chars: 2000,
            chunk_size: 500,
            chunk_overlap: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "http".into(),
            model: String::new(),
            batch_size: 32,
            endpoint: String::new(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.2,
            max_tokens: 1024,
            endpoint: String::new(),
            api_key: None,
            streaming: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub score_threshold: f32,
    pub max_chunks_per_doc: usize,
    pub use_hybrid: bool,
    pub use_reranking: bool,
    pub hybrid_alpha: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            max_chunks_per_doc: 3,
            use_hybrid: true,
            use_reranking: true,
            hybrid_alpha: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub global_per_day: u32,
    pub per_ip_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_day: 10_000,
            per_ip_per_day: 50,
        }
    }
}

/// Top-level application configuration. Deliberately has no file-loading
/// logic (the distilled spec's Non-goals exclude a config-file layer);
/// callers construct this from whatever source they like and may apply
/// [`expand_env`] over an already-parsed key/value map for the
/// `${VAR:-default}` substitution rule described in §6.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub vector_table_name: Option<String>,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub rate_limit: RateLimitConfig,
    pub db_connect_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            vector_table_name: None,
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            rate_limit: RateLimitConfig::default(),
            db_connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Expand `${VAR:-default}` references in `value` using `env`, the
/// already-parsed environment snapshot. Unknown variables with no default
/// expand to an empty string, matching shell parameter expansion semantics
/// for the subset this service relies on.
pub fn expand_env(value: &str, env: &HashMap<String, String>) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if let Some(close_offset) = chars[i + 2..].iter().position(|&c| c == '}') {
                let inner: String = chars[i + 2..i + 2 + close_offset].iter().collect();
                let (name, default) = match inner.split_once(":-") {
                    Some((n, d)) => (n, Some(d)),
                    None => (inner.as_str(), None),
                };
                let resolved = env.get(name).cloned().or_else(|| default.map(str::to_string)).unwrap_or_default();
                out.push_str(&resolved);
                i += 2 + close_offset + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_variable() {
        let mut env = HashMap::new();
        env.insert("HOST".to_string(), "db.internal".to_string());
        assert_eq!(expand_env("${HOST:-localhost}", &env), "db.internal");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        let env = HashMap::new();
        assert_eq!(expand_env("${HOST:-localhost}", &env), "localhost");
    }

    #[test]
    fn expands_within_a_larger_string() {
        let mut env = HashMap::new();
        env.insert("PORT".to_string(), "6543".to_string());
        assert_eq!(
            expand_env("postgres://host:${PORT:-5432}/db", &env),
            "postgres://host:6543/db"
        );
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let env = HashMap::new();
        assert_eq!(expand_env("no placeholders here", &env), "no placeholders here");
    }
}
