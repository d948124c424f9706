use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{default_version, sha256_hex};

/// The cleaner's output contract: one record per source file.
///
/// Fields and invariants per the data model: `id` is unique per corpus,
/// `checksum` changes iff `content` changes, and identical inputs produce
/// byte-identical records across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub title: String,
    pub checksum: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub content: String,
    #[serde(default)]
    pub frontmatter: Option<BTreeMap<String, Value>>,
}

impl Document {
    /// Build a document, computing its checksum from `content` rather than
    /// trusting a caller-supplied value.
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let checksum = checksum_of(&content);
        Self {
            id: id.into(),
            path: path.into(),
            title: title.into(),
            checksum,
            version: default_version(),
            content,
            frontmatter: None,
        }
    }

    /// True if `checksum` does not match the hash of `content` — a sign the
    /// record was constructed from a stale or falsified checksum field.
    pub fn checksum_is_stale(&self) -> bool {
        self.checksum != checksum_of(&self.content)
    }
}

/// Deterministic content checksum: equal content produces equal checksums.
pub fn checksum_of(content: &str) -> String {
    sha256_hex(content)
}

/// The persisted doc row, keyed by `doc_id`.
///
/// Invariant: `chunk_ids` enumerates exactly the chunks currently present
/// in the vector store for this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRow {
    pub doc_id: String,
    pub path: String,
    pub title: String,
    pub version: String,
    pub checksum: String,
    pub chunk_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocRow {
    pub fn from_document(doc: &Document, chunk_ids: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            doc_id: doc.id.clone(),
            path: doc.path.clone(),
            title: doc.title.clone(),
            version: doc.version.clone(),
            checksum: doc.checksum.clone(),
            chunk_ids,
            created_at: now,
            updated_at: now,
        }
    }
}
