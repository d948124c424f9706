use std::sync::Arc;

use chrono::Utc;
use kb_chunker::{chunk_document, ChunkerConfig};
use kb_model::{ChunkRow, DocRow, Document, IndexSignatureInputs};
use kb_providers::Embedder;
use kb_store::{DocStore, VectorStore};
use tracing::{info, warn};

use crate::error::IndexError;

/// Outcome of indexing a single document, per §4.6's per-document procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Skipped,
    Indexed { chunks_added: usize, chunks_deleted: usize },
}

/// Brings the doc store and vector store into agreement with a stream of
/// document records, enforcing the index-signature gate and the
/// checksum-diff skip rule.
pub struct IncrementalIndexer {
    doc_store: Arc<dyn DocStore>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker_config: ChunkerConfig,
}

impl IncrementalIndexer {
    /// Construct the indexer, running the index-signature gate (§4.6): if a
    /// stored signature exists and differs from `signature_inputs`, the
    /// vector store is reset and all doc rows cleared before the new
    /// signature is written. If no signature is stored, it is written.
    pub fn new(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker_config: ChunkerConfig,
        signature_inputs: IndexSignatureInputs,
    ) -> Result<Self, IndexError> {
        let computed = signature_inputs.compute();
        match doc_store.get_index_signature()? {
            Some(stored) if stored != computed.as_str() => {
                warn!(stored, computed = computed.as_str(), "index signature changed, resetting store");
                vector_store.reset()?;
                doc_store.clear_documents()?;
                doc_store.set_index_signature(computed.as_str())?;
            }
            Some(_) => {}
            None => {
                doc_store.set_index_signature(computed.as_str())?;
            }
        }
        Ok(Self {
            doc_store,
            vector_store,
            embedder,
            chunker_config,
        })
    }

    /// Run the per-document procedure from §4.6 steps 1-5.
    pub async fn index_document(&self, doc: &Document, force_rebuild: bool) -> Result<IndexOutcome, IndexError> {
        let stored_checksum = self.doc_store.get_checksum(&doc.id)?;
        if !force_rebuild && stored_checksum.as_deref() == Some(doc.checksum.as_str()) {
            return Ok(IndexOutcome::Skipped);
        }

        let stored_chunk_ids = self.doc_store.get_chunk_ids(&doc.id)?;
        if !stored_chunk_ids.is_empty() {
            self.vector_store.delete_chunks(&stored_chunk_ids)?;
        }

        let chunks = chunk_document(doc, &self.chunker_config);
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed_documents(&texts).await?;
            let now = Utc::now();
            let rows: Vec<ChunkRow> = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    chunk_ids.push(chunk.chunk_id.clone());
                    ChunkRow::new(chunk, embedding, now)
                })
                .collect();
            self.vector_store.add_chunks(&rows)?;
        }

        let doc_row = DocRow::from_document(doc, chunk_ids, Utc::now());
        self.doc_store.upsert(&doc_row)?;

        info!(doc_id = %doc.id, chunks_added = doc_row.chunk_ids.len(), "indexed document");
        Ok(IndexOutcome::Indexed {
            chunks_added: doc_row.chunk_ids.len(),
            chunks_deleted: stored_chunk_ids.len(),
        })
    }

    /// All currently persisted document rows, for pipeline-level pruning.
    pub fn list_documents(&self) -> Result<Vec<DocRow>, IndexError> {
        Ok(self.doc_store.list_documents()?)
    }

    /// Delete a document and its chunks outright (the `Sync::Prune` policy).
    pub fn prune_document(&self, doc_id: &str) -> Result<(), IndexError> {
        self.vector_store.delete_chunks_for_doc(doc_id)?;
        self.doc_store.delete(doc_id)?;
        Ok(())
    }

    /// Delete only the doc-store row, leaving its chunks orphaned. Used in
    /// tests to simulate the crash window reconciliation exists to repair.
    #[cfg(test)]
    fn delete_doc_row_only(&self, doc_id: &str) -> Result<(), IndexError> {
        self.doc_store.delete(doc_id)?;
        Ok(())
    }

    /// Reconciliation pass for the "crash between steps 4 and 5" case
    /// (§4.6): delete any vector-store chunks whose `doc_id` has no
    /// matching row in the doc store.
    pub fn reconcile_orphans(&self) -> Result<usize, IndexError> {
        let known: std::collections::HashSet<String> =
            self.doc_store.list_documents()?.into_iter().map(|d| d.doc_id).collect();
        let mut deleted = 0;
        for doc_id in self.vector_store.distinct_doc_ids()? {
            if !known.contains(&doc_id) {
                self.vector_store.delete_chunks_for_doc(&doc_id)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            warn!(deleted, "removed orphan chunks during reconciliation");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_providers::FakeEmbedder;
    use kb_store::{SqliteDocStore, SqliteVectorStore};
    use rusqlite::Connection;

    fn indexer() -> IncrementalIndexer {
        let doc_store = Arc::new(SqliteDocStore::open(Connection::open_in_memory().unwrap()).unwrap());
        let vector_store = Arc::new(SqliteVectorStore::open(Connection::open_in_memory().unwrap(), "kb_chunks_test", 8).unwrap());
        let embedder = Arc::new(FakeEmbedder::new(8));
        let signature_inputs = IndexSignatureInputs {
            embedding_model: "fake-embedder".into(),
            embedding_dim: 8,
            chunk_size: 500,
            chunk_overlap: 80,
            max_section_chars: 2000,
            table_name: "kb_chunks_test".into(),
        };
        IncrementalIndexer::new(doc_store, vector_store, embedder, ChunkerConfig::default(), signature_inputs).unwrap()
    }

    #[tokio::test]
    async fn first_run_indexes_document() {
        let indexer = indexer();
        let doc = Document::new("doc-a", "a.md", "A", "# Title\n\nSome content here.");
        let outcome = indexer.index_document(&doc, false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Indexed { chunks_added, .. } if chunks_added > 0));
    }

    #[tokio::test]
    async fn second_run_with_identical_checksum_is_skipped() {
        let indexer = indexer();
        let doc = Document::new("doc-a", "a.md", "A", "# Title\n\nSome content here.");
        indexer.index_document(&doc, false).await.unwrap();
        let outcome = indexer.index_document(&doc, false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Skipped);
    }

    #[tokio::test]
    async fn content_change_reindexes_and_replaces_chunks() {
        let indexer = indexer();
        let doc_v1 = Document::new("doc-a", "a.md", "A", "# Title\n\nOriginal content.");
        indexer.index_document(&doc_v1, false).await.unwrap();
        let doc_v2 = Document::new("doc-a", "a.md", "A", "# Title\n\nCompletely different content now.");
        let outcome = indexer.index_document(&doc_v2, false).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Indexed { chunks_deleted, .. } if chunks_deleted > 0));
    }

    #[tokio::test]
    async fn force_rebuild_reindexes_unchanged_document() {
        let indexer = indexer();
        let doc = Document::new("doc-a", "a.md", "A", "# Title\n\nSome content here.");
        indexer.index_document(&doc, false).await.unwrap();
        let outcome = indexer.index_document(&doc, true).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Indexed { .. }));
    }

    #[tokio::test]
    async fn reconcile_removes_chunks_with_no_doc_row() {
        let indexer = indexer();
        let doc = Document::new("doc-a", "a.md", "A", "# Title\n\nSome content here.");
        indexer.index_document(&doc, false).await.unwrap();
        indexer.delete_doc_row_only("doc-a").unwrap();
        let removed = indexer.reconcile_orphans().unwrap();
        assert_eq!(removed, 1);
    }
}
