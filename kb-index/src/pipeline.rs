use std::collections::HashSet;
use std::io::BufRead;

use kb_model::Document;
use tracing::warn;

use crate::error::IndexError;
use crate::indexer::{IncrementalIndexer, IndexOutcome};

/// Deletion policy for documents absent from the current run (§9 Open
/// Question 1). `Keep` is the default and never deletes; `Prune` removes
/// any document not present in the records just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sync {
    Keep,
    Prune,
}

impl Default for Sync {
    fn default() -> Self {
        Sync::Keep
    }
}

/// Aggregate outcome of one pipeline run (§4.6 ambient detail, §6a).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub chunks_added: usize,
    pub chunks_deleted: usize,
    pub parse_errors: usize,
    pub pruned: usize,
    pub errors: Vec<(String, String)>,
}

/// Drives documents from the cleaner's NDJSON output through an
/// [`IncrementalIndexer`], tolerating per-line parse errors and
/// per-document indexing failures without aborting the run.
pub struct PipelineDriver<'a> {
    indexer: &'a IncrementalIndexer,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(indexer: &'a IncrementalIndexer) -> Self {
        Self { indexer }
    }

    /// Run the pipeline over an NDJSON byte stream: one `Document` per
    /// non-blank line. A malformed line is skipped and counted in
    /// `parse_errors` (§6a); it does not abort the run.
    pub async fn run<R: BufRead>(&self, reader: R, force_rebuild: bool, sync: Sync) -> Result<PipelineStats, IndexError> {
        let mut stats = PipelineStats::default();
        let mut seen_doc_ids: HashSet<String> = HashSet::new();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => {
                    stats.parse_errors += 1;
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let doc: Document = match serde_json::from_str(trimmed) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "skipping malformed cleaner record");
                    stats.parse_errors += 1;
                    continue;
                }
            };

            stats.total += 1;
            seen_doc_ids.insert(doc.id.clone());

            match self.indexer.index_document(&doc, force_rebuild).await {
                Ok(IndexOutcome::Skipped) => stats.skipped += 1,
                Ok(IndexOutcome::Indexed { chunks_added, chunks_deleted }) => {
                    stats.indexed += 1;
                    stats.chunks_added += chunks_added;
                    stats.chunks_deleted += chunks_deleted;
                }
                Err(e) => {
                    stats.errors.push((doc.id.clone(), e.to_string()));
                }
            }
        }

        if sync == Sync::Prune {
            stats.pruned = self.prune_absent(&seen_doc_ids)?;
        }

        Ok(stats)
    }

    fn prune_absent(&self, seen_doc_ids: &HashSet<String>) -> Result<usize, IndexError> {
        let mut pruned = 0;
        for row in self.indexer.list_documents()? {
            if !seen_doc_ids.contains(&row.doc_id) {
                self.indexer.prune_document(&row.doc_id)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_chunker::ChunkerConfig;
    use kb_model::IndexSignatureInputs;
    use kb_providers::FakeEmbedder;
    use kb_store::{SqliteDocStore, SqliteVectorStore};
    use rusqlite::Connection;
    use std::io::Cursor;
    use std::sync::Arc;

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

    fn doc_line(id: &str, content: &str) -> String {
        let doc = Document::new(id, format!("{id}.md"), id, content);
        serde_json::to_string(&doc).unwrap()
    }

    #[tokio::test]
    async fn processes_three_records_and_counts_indexed() {
        let indexer = indexer();
        let driver = PipelineDriver::new(&indexer);
        let ndjson = format!(
            "{}\n{}\n{}\n",
            doc_line("a", "# A\n\ncontent a"),
            doc_line("b", "# B\n\ncontent b"),
            doc_line("c", "# C\n\ncontent c"),
        );
        let stats = driver.run(Cursor::new(ndjson), false, Sync::Keep).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.skipped, 0);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped_and_counted() {
        let indexer = indexer();
        let driver = PipelineDriver::new(&indexer);
        let ndjson = format!("not json\n{}\n", doc_line("a", "# A\n\ncontent a"));
        let stats = driver.run(Cursor::new(ndjson), false, Sync::Keep).await.unwrap();
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn rerun_with_identical_input_is_a_full_skip() {
        let indexer = indexer();
        let driver = PipelineDriver::new(&indexer);
        let ndjson = doc_line("a", "# A\n\ncontent a");
        driver.run(Cursor::new(ndjson.clone()), false, Sync::Keep).await.unwrap();
        let stats = driver.run(Cursor::new(ndjson), false, Sync::Keep).await.unwrap();
        assert_eq!(stats.skipped, stats.total);
    }

    #[tokio::test]
    async fn prune_removes_documents_absent_from_new_run() {
        let indexer = indexer();
        let driver = PipelineDriver::new(&indexer);
        let first = format!("{}\n{}\n", doc_line("a", "# A\n\ncontent a"), doc_line("b", "# B\n\ncontent b"));
        driver.run(Cursor::new(first), false, Sync::Keep).await.unwrap();
        let second = doc_line("a", "# A\n\ncontent a");
        let stats = driver.run(Cursor::new(second), false, Sync::Prune).await.unwrap();
        assert_eq!(stats.pruned, 1);
    }

    #[tokio::test]
    async fn keep_policy_never_prunes() {
        let indexer = indexer();
        let driver = PipelineDriver::new(&indexer);
        let first = format!("{}\n{}\n", doc_line("a", "# A\n\ncontent a"), doc_line("b", "# B\n\ncontent b"));
        driver.run(Cursor::new(first), false, Sync::Keep).await.unwrap();
        let second = doc_line("a", "# A\n\ncontent a");
        let stats = driver.run(Cursor::new(second), false, Sync::Keep).await.unwrap();
        assert_eq!(stats.pruned, 0);
    }
}
