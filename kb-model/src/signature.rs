use serde::{Deserialize, Serialize};

use crate::sha256_hex;

/// Stable hash over embedding + chunking parameters. A mismatch between a
/// stored and freshly-computed signature means the vector table is
/// incompatible and must be reset before any new indexing proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSignature(pub String);

impl IndexSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IndexSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parameters that make two index configurations compatible or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSignatureInputs {
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_section_chars: usize,
    pub table_name: String,
}

impl IndexSignatureInputs {
    /// Compute a stable signature. Field order inside the JSON payload is
    /// fixed by `serde_json`'s struct-field order combined with explicit
    /// key sorting, so two processes on the same inputs always agree.
    pub fn compute(&self) -> IndexSignature {
        let mut map = serde_json::Map::new();
        map.insert("embedding_model".into(), self.embedding_model.clone().into());
        map.insert("embedding_dim".into(), self.embedding_dim.into());
        map.insert("chunk_size".into(), self.chunk_size.into());
        map.insert("chunk_overlap".into(), self.chunk_overlap.into());
        map.insert("max_section_chars".into(), self.max_section_chars.into());
        map.insert("table_name".into(), self.table_name.clone().into());
        let payload = serde_json::Value::Object(map).to_string();
        IndexSignature(sha256_hex(&payload))
    }
}

/// Deterministic vector-table name derived from the embedding model id, so
/// two configurations with different embeddings never collide.
pub fn table_name_for_model(embedding_model: &str) -> String {
    let safe = embedding_model.replace('/', "_").replace('-', "_");
    format!("kb_chunks_{safe}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> IndexSignatureInputs {
        IndexSignatureInputs {
            embedding_model: "text-embedding-3-small".into(),
            embedding_dim: 1536,
            chunk_size: 500,
            chunk_overlap: 80,
            max_section_chars: 2000,
            table_name: table_name_for_model("text-embedding-3-small"),
        }
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(inputs().compute(), inputs().compute());
    }

    #[test]
    fn changes_with_chunk_size() {
        let mut other = inputs();
        other.chunk_size = 600;
        assert_ne!(inputs().compute(), other.compute());
    }

    #[test]
    fn table_name_avoids_collisions() {
        assert_ne!(
            table_name_for_model("model-a"),
            table_name_for_model("model-b")
        );
        assert_eq!(table_name_for_model("BAAI/bge-m3"), "kb_chunks_BAAI_bge_m3");
    }
}
