//! Document metadata plus chunk storage: the concrete "relational store
//! with vector-search capability" — a SQLite database holding chunk rows,
//! an in-memory HNSW graph for approximate nearest-neighbor search, and a
//! term-overlap lexical search over the same rows — and reciprocal rank
//! fusion over the two.

pub mod doc_store;
pub mod error;
pub mod hybrid;
pub mod vector_store;

pub use doc_store::{DocStore, SqliteDocStore};
pub use error::StoreError;
pub use hybrid::{reciprocal_rank_fusion, FusedChunk, RrfConfig};
pub use vector_store::{ScoredChunk, SqliteVectorStore, VectorStore};
