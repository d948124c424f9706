//! Shared types used across the indexing and retrieval crates.
//!
//! Mirrors the teacher's `chunk-model` crate: small, dependency-light
//! records that every other crate in the workspace builds on.

pub mod document;
pub mod chunk;
pub mod signature;

pub use chunk::{Chunk, ChunkRow};
pub use document::{DocRow, Document};
pub use signature::{table_name_for_model, IndexSignature, IndexSignatureInputs};

/// Hex-encoded SHA-256 digest, used for both document checksums and chunk ids.
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Default document version when a cleaner record omits one.
pub fn default_version() -> String {
    "latest".to_string()
}
