use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use hnsw_rs::prelude::*;
use kb_model::ChunkRow;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// A chunk plus its score in one particular retrieval list. `score` is
/// always normalized to `[0, 1]`; higher is more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ChunkRow,
    pub score: f32,
}

/// Chunk persistence plus the two retrieval primitives hybrid search fuses
/// (§4.3, §4.4): approximate nearest-neighbor over embeddings, and a
/// term-overlap lexical search.
pub trait VectorStore: Send + Sync {
    fn add_chunks(&self, chunks: &[ChunkRow]) -> Result<(), StoreError>;
    fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError>;
    fn delete_chunks_for_doc(&self, doc_id: &str) -> Result<(), StoreError>;
    fn search_semantic(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, StoreError>;
    fn search_lexical(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, StoreError>;
    fn reset(&self) -> Result<(), StoreError>;
    fn table_name(&self) -> &str;

    /// Distinct `doc_id`s with at least one chunk present. Used by the
    /// startup reconciliation pass (§4.6 step "crash between steps 4 and
    /// 5") to find orphan chunks whose document row never got written.
    fn distinct_doc_ids(&self) -> Result<Vec<String>, StoreError>;
}

fn validate_table_name(name: &str) -> Result<(), StoreError> {
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || name.is_empty() {
        return Err(StoreError::InvalidConfiguration {
            message: format!("invalid table name: {name}"),
        });
    }
    Ok(())
}

/// A snapshot of the HNSW graph, rebuilt from the SQLite table whenever a
/// mutation invalidates it. hnsw_rs has no incremental delete, so the graph
/// is always a full rebuild over the current row set — the same approach
/// an offline index builder uses when it calls `parallel_insert` once per
/// build rather than maintaining the graph incrementally.
struct HnswCache {
    id_map: Vec<String>,
    graph: Hnsw<'static, f32, DistCosine>,
}

/// SQLite-backed `VectorStore`: one table per embedding configuration
/// (named via [`kb_model::table_name_for_model`]), an in-memory HNSW graph
/// rebuilt lazily for semantic search, and substring-overlap scoring for
/// lexical search.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    table: String,
    dimension: usize,
    hnsw: Mutex<Option<HnswCache>>,
}

impl SqliteVectorStore {
    pub fn open(conn: Connection, table: &str, dimension: usize) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                chunk_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                content TEXT NOT NULL,
                heading_path_json TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {table}_doc_id ON {table}(doc_id);"
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            dimension,
            hnsw: Mutex::new(None),
        })
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRow> {
        let heading_path_json: String = row.get("heading_path_json")?;
        let embedding_json: String = row.get("embedding_json")?;
        let created_at: String = row.get("created_at")?;
        Ok(ChunkRow {
            chunk_id: row.get("chunk_id")?,
            doc_id: row.get("doc_id")?,
            content: row.get("content")?,
            heading_path: serde_json::from_str(&heading_path_json).unwrap_or_default(),
            chunk_index: row.get::<_, i64>("chunk_index")? as usize,
            embedding: serde_json::from_str(&embedding_json).unwrap_or_default(),
            created_at: parse_timestamp(&created_at),
        })
    }

    fn all_rows(&self) -> Result<Vec<ChunkRow>, StoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", self.table))?;
        let rows = stmt
            .query_map([], Self::row_to_chunk)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn invalidate_hnsw(&self) {
        *self.hnsw.lock().expect("hnsw cache mutex poisoned") = None;
    }

    fn with_hnsw<T>(&self, f: impl FnOnce(&HnswCache) -> T) -> Result<T, StoreError> {
        let mut guard = self.hnsw.lock().expect("hnsw cache mutex poisoned");
        if guard.is_none() {
            let rows = self.all_rows()?;
            tracing::debug!(table = %self.table, rows = rows.len(), "rebuilding hnsw graph");
            let id_map: Vec<String> = rows.iter().map(|r| r.chunk_id.clone()).collect();
            let total = rows.len().max(1);
            let max_nb_connection = 32;
            let ef_construction = 200.max(max_nb_connection);
            let nb_layer = 16;
            let graph = Hnsw::<f32, DistCosine>::new(max_nb_connection, total, nb_layer, ef_construction, DistCosine {});
            if !rows.is_empty() {
                let insert_data: Vec<(&Vec<f32>, usize)> =
                    rows.iter().enumerate().map(|(i, r)| (&r.embedding, i)).collect();
                graph.parallel_insert(&insert_data);
            }
            *guard = Some(HnswCache { id_map, graph });
        }
        Ok(f(guard.as_ref().expect("just populated")))
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

fn break_ties(mut scored: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    scored.truncate(top_k);
    scored
}

impl VectorStore for SqliteVectorStore {
    fn add_chunks(&self, chunks: &[ChunkRow]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: chunk.embedding.len(),
                });
            }
        }
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        for chunk in chunks {
            let heading_path_json = serde_json::to_string(&chunk.heading_path)?;
            let embedding_json = serde_json::to_string(&chunk.embedding)?;
            conn.execute(
                &format!(
                    "INSERT INTO {} (chunk_id, doc_id, content, heading_path_json, chunk_index, embedding_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(chunk_id) DO UPDATE SET
                        doc_id = excluded.doc_id,
                        content = excluded.content,
                        heading_path_json = excluded.heading_path_json,
                        chunk_index = excluded.chunk_index,
                        embedding_json = excluded.embedding_json",
                    self.table
                ),
                params![
                    chunk.chunk_id,
                    chunk.doc_id,
                    chunk.content,
                    heading_path_json,
                    chunk.chunk_index as i64,
                    embedding_json,
                    chunk.created_at.to_rfc3339(),
                ],
            )?;
        }
        drop(conn);
        self.invalidate_hnsw();
        Ok(())
    }

    fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        for chunk_id in chunk_ids {
            conn.execute(
                &format!("DELETE FROM {} WHERE chunk_id = ?1", self.table),
                params![chunk_id],
            )?;
        }
        drop(conn);
        self.invalidate_hnsw();
        Ok(())
    }

    fn delete_chunks_for_doc(&self, doc_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        conn.execute(
            &format!("DELETE FROM {} WHERE doc_id = ?1", self.table),
            params![doc_id],
        )?;
        drop(conn);
        self.invalidate_hnsw();
        Ok(())
    }

    fn search_semantic(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let rows = self.all_rows()?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ef_search = 64.max(top_k);
        let scored = self.with_hnsw(|cache| {
            let neighbours = cache.graph.search(query, top_k.max(1), ef_search);
            neighbours
                .into_iter()
                .filter_map(|n| {
                    let chunk_id = cache.id_map.get(n.d_id)?;
                    let chunk = rows.iter().find(|r| &r.chunk_id == chunk_id)?.clone();
                    let score = (1.0 - n.distance).clamp(0.0, 1.0);
                    Some(ScoredChunk { chunk, score })
                })
                .collect::<Vec<_>>()
        })?;
        Ok(break_ties(scored, top_k))
    }

    fn search_lexical(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.all_rows()?;
        let scored: Vec<ScoredChunk> = rows
            .into_iter()
            .filter_map(|chunk| {
                let lower = chunk.content.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                let score = matched as f32 / terms.len() as f32;
                Some(ScoredChunk { chunk, score })
            })
            .collect();
        Ok(break_ties(scored, top_k))
    }

    fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        drop(conn);
        self.invalidate_hnsw();
        Ok(())
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn distinct_doc_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT DISTINCT doc_id FROM {}", self.table))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(chunk_id: &str, doc_id: &str, content: &str, embedding: Vec<f32>) -> ChunkRow {
        ChunkRow {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            content: content.into(),
            heading_path: vec![],
            chunk_index: 0,
            embedding,
            created_at: Utc::now(),
        }
    }

    fn store(dim: usize) -> SqliteVectorStore {
        SqliteVectorStore::open(Connection::open_in_memory().unwrap(), "kb_chunks_test", dim).unwrap()
    }

    #[test]
    fn empty_add_is_a_no_op() {
        let store = store(4);
        store.add_chunks(&[]).unwrap();
        assert_eq!(store.search_lexical("anything", 10).unwrap().len(), 0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let store = store(4);
        let err = store.add_chunks(&[row("c1", "d1", "hello", vec![0.1, 0.2])]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn add_then_delete_removes_from_lexical_search() {
        let store = store(2);
        store.add_chunks(&[row("c1", "d1", "rust programming", vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.search_lexical("rust", 10).unwrap().len(), 1);
        store.delete_chunks(&["c1".to_string()]).unwrap();
        assert_eq!(store.search_lexical("rust", 10).unwrap().len(), 0);
    }

    #[test]
    fn lexical_score_is_fraction_of_matched_terms() {
        let store = store(2);
        store
            .add_chunks(&[row("c1", "d1", "rust is a systems language", vec![1.0, 0.0])])
            .unwrap();
        let results = store.search_lexical("rust ocean", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.5);
    }

    #[test]
    fn semantic_search_ranks_closer_vector_first() {
        let store = store(2);
        store
            .add_chunks(&[
                row("near", "d1", "a", vec![1.0, 0.0]),
                row("far", "d1", "b", vec![0.0, 1.0]),
            ])
            .unwrap();
        let results = store.search_semantic(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.chunk_id, "near");
    }

    #[test]
    fn delete_chunks_for_doc_removes_all_matching_rows() {
        let store = store(2);
        store
            .add_chunks(&[
                row("c1", "d1", "a", vec![1.0, 0.0]),
                row("c2", "d1", "b", vec![0.0, 1.0]),
                row("c3", "d2", "c", vec![0.5, 0.5]),
            ])
            .unwrap();
        store.delete_chunks_for_doc("d1").unwrap();
        let remaining = store.search_lexical("a b c", 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk.doc_id, "d2");
    }

    #[test]
    fn distinct_doc_ids_deduplicates() {
        let store = store(2);
        store
            .add_chunks(&[
                row("c1", "d1", "a", vec![1.0, 0.0]),
                row("c2", "d1", "b", vec![0.0, 1.0]),
                row("c3", "d2", "c", vec![0.5, 0.5]),
            ])
            .unwrap();
        let mut ids = store.distinct_doc_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["d1".to_string(), "d2".to_string()]);
    }

    #[test]
    fn reset_clears_all_rows() {
        let store = store(2);
        store.add_chunks(&[row("c1", "d1", "a", vec![1.0, 0.0])]).unwrap();
        store.reset().unwrap();
        assert_eq!(store.search_lexical("a", 10).unwrap().len(), 0);
    }
}
