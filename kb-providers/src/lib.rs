//! Provider capability abstractions (§9 "dynamic provider dispatch"):
//! one trait per capability, one variant per concrete provider, each
//! configured at construction time. Callers depend only on the trait
//! object; there is no runtime type introspection.

pub mod chat;
pub mod embedder;
pub mod retry;

pub use chat::{ChatError, ChatModel, FakeChatModel, HttpChatConfig, HttpChatModel};
pub use embedder::{Embedder, EmbedderInfo, EmbeddingError, FakeEmbedder, HttpEmbedder, HttpEmbedderConfig};
