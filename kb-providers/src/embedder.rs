use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{with_backoff, RetryableError};

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: String,
    pub embedding_model_id: String,
    pub dimension: usize,
}

/// Errors produced by embedder operations, classified per §4.2/§7:
/// 4xx authentication and malformed-request errors are fatal; 429 and 5xx
/// are retryable; a dimension mismatch across calls is fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedder configuration invalid: {message}")]
    InvalidConfiguration { message: String },
    #[error("embedder provider failure (fatal): {message}")]
    Fatal { message: String },
    #[error("embedder provider failure (retryable): {message}")]
    Retryable { message: String },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RetryableError for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Retryable { .. })
    }
}

/// Batched text-to-vector capability. All vectors share a fixed dimension
/// determined at initialization by embedding a probe string.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Configuration for an HTTP-backed embedding provider.
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub batch_size: usize,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            model: String::new(),
            batch_size: 32,
            timeout: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// HTTP client for an embedding provider exposing an OpenAI-shaped
/// `{model, input} -> {data: [{embedding}]}` contract.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: HttpEmbedderConfig,
    info: EmbedderInfo,
}

impl HttpEmbedder {
    /// Construct the client and probe the provider's dimension by embedding
    /// a fixed probe string, per §4.2.
    pub async fn connect(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.endpoint.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfiguration {
                message: "endpoint must not be empty".into(),
            });
        }
        if config.batch_size == 0 {
            return Err(EmbeddingError::InvalidConfiguration {
                message: "batch_size must be greater than zero".into(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Fatal {
                message: format!("failed to build http client: {e}"),
            })?;

        let mut probe_info = EmbedderInfo {
            provider: "http".into(),
            embedding_model_id: config.model.clone(),
            dimension: 0,
        };

        let probe = Self {
            client: client.clone(),
            config: config.clone(),
            info: probe_info.clone(),
        };
        let probe_vector = probe.request_batch(&[String::from("dimension probe")]).await?;
        let dimension = probe_vector
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::Fatal {
                message: "provider returned no vectors for probe request".into(),
            })?;
        probe_info.dimension = dimension;

        Ok(Self {
            client,
            config,
            info: probe_info,
        })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        with_backoff(self.config.max_retries, Duration::from_millis(500), || {
            self.request_batch_once(texts)
        })
        .await
    }

    async fn request_batch_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .json(&EmbedRequest {
                model: &self.config.model,
                input: texts,
            });
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                EmbeddingError::Retryable {
                    message: format!("request failed: {e}"),
                }
            } else {
                EmbeddingError::Fatal {
                    message: format!("request failed: {e}"),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body));
        }

        let parsed: EmbedResponse = resp.json().await.map_err(|e| EmbeddingError::Fatal {
            message: format!("malformed embedding response: {e}"),
        })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Fatal {
                message: format!(
                    "provider returned {} vectors for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn check_dimension(&self, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
        for v in vectors {
            if v.len() != self.info.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.info.dimension,
                    actual: v.len(),
                });
            }
        }
        Ok(())
    }
}

fn classify_http_error(status: u16, body: &str) -> EmbeddingError {
    match status {
        429 => EmbeddingError::Retryable {
            message: format!("rate limited (429): {body}"),
        },
        500..=599 => EmbeddingError::Retryable {
            message: format!("server error ({status}): {body}"),
        },
        401 | 403 => EmbeddingError::Fatal {
            message: format!("authentication failed ({status}): {body}"),
        },
        _ => EmbeddingError::Fatal {
            message: format!("request rejected ({status}): {body}"),
        },
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request_batch(&[text.to_string()]).await?;
        self.check_dimension(&vectors)?;
        Ok(vectors.remove(0))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let vectors = self.request_batch(batch).await?;
            self.check_dimension(&vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Deterministic, hash-based embedder used in tests and offline demos so
/// the rest of the pipeline can be exercised without a live provider.
/// Text fed to `embed_query` and `embed_documents` with the same bytes
/// produces the same vector, matching the round-trip law in §8.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    info: EmbedderInfo,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: EmbedderInfo {
                provider: "fake".into(),
                embedding_model_id: "fake-embedder".into(),
                dimension,
            },
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        (0..self.info.dimension)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bits = hasher.finish();
                ((bits as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}
