use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{with_backoff, RetryableError};

/// Errors produced by chat-model operations; same fatal/retryable split as
/// [`crate::embedder::EmbeddingError`] (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat provider configuration invalid: {message}")]
    InvalidConfiguration { message: String },
    #[error("chat provider failure (fatal): {message}")]
    Fatal { message: String },
    #[error("chat provider failure (retryable): {message}")]
    Retryable { message: String },
}

impl RetryableError for ChatError {
    fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Retryable { .. })
    }
}

/// Text-generation capability, with optional true token streaming.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;

    /// Stream generated text incrementally. Providers that cannot stream
    /// natively return `Err(ChatError::Fatal)`; the caller (the `/stream`
    /// endpoint) falls back to splitting a non-streaming `generate` result
    /// into whitespace-separated fragments, per §4.9 event 5.
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError>;

    fn supports_streaming(&self) -> bool;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct HttpChatConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub streaming: bool,
}

impl Default for HttpChatConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
            max_retries: 5,
            streaming: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP client for a chat-completion provider exposing an OpenAI-shaped
/// `{model, messages} -> {choices: [{message: {content}}]}` contract, with
/// an SSE-delta streaming variant when `config.streaming` is set.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: HttpChatConfig,
}

impl HttpChatModel {
    pub fn new(config: HttpChatConfig) -> Result<Self, ChatError> {
        if config.endpoint.trim().is_empty() {
            return Err(ChatError::InvalidConfiguration {
                message: "endpoint must not be empty".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Fatal {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn request(&self, prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        };
        let mut req = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

fn classify_http_error(status: u16, body: &str) -> ChatError {
    match status {
        429 => ChatError::Retryable {
            message: format!("rate limited (429): {body}"),
        },
        500..=599 => ChatError::Retryable {
            message: format!("server error ({status}): {body}"),
        },
        401 | 403 => ChatError::Fatal {
            message: format!("authentication failed ({status}): {body}"),
        },
        _ => ChatError::Fatal {
            message: format!("request rejected ({status}): {body}"),
        },
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        with_backoff(self.config.max_retries, Duration::from_millis(500), || async {
            let resp = self.request(prompt, false).send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ChatError::Retryable { message: format!("request failed: {e}") }
                } else {
                    ChatError::Fatal { message: format!("request failed: {e}") }
                }
            })?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_http_error(status.as_u16(), &body));
            }
            let parsed: ChatResponse = resp.json().await.map_err(|e| ChatError::Fatal {
                message: format!("malformed chat response: {e}"),
            })?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| ChatError::Fatal {
                    message: "provider returned no choices".into(),
                })
        })
        .await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError> {
        if !self.config.streaming {
            return Err(ChatError::Fatal {
                message: "provider does not support token streaming".into(),
            });
        }

        let resp = self.request(prompt, true).send().await.map_err(|e| ChatError::Retryable {
            message: format!("request failed: {e}"),
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body));
        }

        let byte_stream = resp.bytes_stream();
        let deltas = byte_stream
            .scan(Vec::<u8>::new(), |buf, chunk| {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => return futures_util::future::ready(Some(vec![Err(ChatError::Retryable {
                        message: format!("stream read failed: {e}"),
                    })])),
                };
                buf.extend_from_slice(&chunk);
                let mut out = Vec::new();
                while let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
                    let line: Vec<u8> = buf.drain(..pos + 2).collect();
                    if let Some(delta) = parse_sse_delta(&line) {
                        out.push(delta);
                    }
                }
                futures_util::future::ready(Some(out))
            })
            .flat_map(stream::iter)
            .filter_map(|item| async move {
                match item {
                    Ok(Some(text)) => Some(Ok(text)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(deltas))
    }

    fn supports_streaming(&self) -> bool {
        self.config.streaming
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Parse one `data: {...}` SSE frame into a delta-text fragment, or `None`
/// for keep-alives / the terminal `[DONE]` marker.
fn parse_sse_delta(frame: &[u8]) -> Option<Result<Option<String>, ChatError>> {
    let text = String::from_utf8_lossy(frame);
    for line in text.lines() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else { continue };
        let payload = payload.trim();
        if payload == "[DONE]" {
            return Some(Ok(None));
        }
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return Some(Err(ChatError::Fatal { message: format!("malformed stream frame: {e}") })),
        };
        let delta = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());
        return Some(Ok(delta));
    }
    None
}

/// Deterministic chat model for tests and offline demos: echoes a fixed
/// templated answer and, when asked to stream, splits it into
/// word-sized fragments with no network access.
pub struct FakeChatModel {
    model_name: String,
    streaming: bool,
}

impl FakeChatModel {
    pub fn new(streaming: bool) -> Self {
        Self {
            model_name: "fake-chat-model".into(),
            streaming,
        }
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        Ok(format!("Answer based on the provided context for: {prompt}"))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError> {
        if !self.streaming {
            return Err(ChatError::Fatal {
                message: "fake chat model configured without streaming".into(),
            });
        }
        let answer = self.generate(prompt).await?;
        let words: Vec<String> = answer.split_whitespace().map(|w| format!("{w} ")).collect();
        Ok(Box::pin(stream::iter(words.into_iter().map(Ok))))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
