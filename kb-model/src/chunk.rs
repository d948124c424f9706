use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sha256_hex;

/// A hierarchically-placed slice of a document: the unit of retrieval.
///
/// Identity is a pure function of ordered inputs (see [`chunk_id`]), so
/// content edits invalidate only the affected chunk while insertions shift
/// `chunk_index` and propagate identity changes to subsequent chunks — this
/// is intentional, not a bug to paper over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
    pub heading_path: Vec<String>,
    pub chunk_index: usize,
}

impl Chunk {
    /// Construct a chunk, deriving its id from the other fields plus the
    /// document's version (`chunk_id` is not itself part of document
    /// identity, so it is passed in rather than stored on `Chunk`).
    pub fn new(
        doc_id: impl Into<String>,
        version: &str,
        content: impl Into<String>,
        heading_path: Vec<String>,
        chunk_index: usize,
    ) -> Self {
        let doc_id = doc_id.into();
        let content = content.into();
        let chunk_id = chunk_id(&doc_id, version, &heading_path, chunk_index, &content);
        Self {
            chunk_id,
            doc_id,
            content,
            heading_path,
            chunk_index,
        }
    }
}

/// `chunk_id = H(doc_id || ":" || version || ":" || join(heading_path, ":")
/// || ":" || chunk_index || ":" || H(content))`, per the data model's chunk
/// identity formula, with `H` fixed to SHA-256.
pub fn chunk_id(
    doc_id: &str,
    version: &str,
    heading_path: &[String],
    chunk_index: usize,
    content: &str,
) -> String {
    let content_hash = sha256_hex(content);
    let input = format!(
        "{doc_id}:{version}:{}:{chunk_index}:{content_hash}",
        heading_path.join(":")
    );
    sha256_hex(&input)
}

/// The persisted chunk row, keyed by `chunk_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
    pub heading_path: Vec<String>,
    pub chunk_index: usize,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl ChunkRow {
    pub fn new(chunk: Chunk, embedding: Vec<f32>, created_at: DateTime<Utc>) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            doc_id: chunk.doc_id,
            content: chunk.content,
            heading_path: chunk.heading_path,
            chunk_index: chunk.chunk_index,
            embedding,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_stable_across_runs() {
        let heading = vec!["Intro".to_string()];
        let a = chunk_id("doc-a", "latest", &heading, 0, "hello");
        let b = chunk_id("doc-a", "latest", &heading, 0, "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn identity_changes_with_index() {
        let heading = vec!["Intro".to_string()];
        let a = chunk_id("doc-a", "latest", &heading, 0, "hello");
        let b = chunk_id("doc-a", "latest", &heading, 1, "hello");
        assert_ne!(a, b);
    }

    #[test]
    fn identity_unaffected_by_unrelated_content_elsewhere() {
        // Appending content to a *different* chunk's text does not change
        // this chunk's id: identity depends only on this chunk's own inputs.
        let heading = vec!["Intro".to_string()];
        let a = chunk_id("doc-a", "latest", &heading, 0, "hello");
        let b = chunk_id("doc-a", "latest", &heading, 0, "hello");
        assert_eq!(a, b);
    }
}
