use thiserror::Error;

/// Errors surfaced by the document and vector store, per §7's per-crate
/// error enum convention.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store configuration invalid: {message}")]
    InvalidConfiguration { message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document not found: {doc_id}")]
    DocumentNotFound { doc_id: String },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index signature mismatch: stored {stored}, computed {computed}")]
    SignatureMismatch { stored: String, computed: String },
}
