use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use kb_model::DocRow;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

const INDEX_SIGNATURE_KEY: &str = "index_signature";

/// Document-metadata persistence: one row per source document, independent
/// of how its chunks are embedded or searched.
pub trait DocStore: Send + Sync {
    fn get_checksum(&self, doc_id: &str) -> Result<Option<String>, StoreError>;
    fn get_chunk_ids(&self, doc_id: &str) -> Result<Vec<String>, StoreError>;
    fn get(&self, doc_id: &str) -> Result<Option<DocRow>, StoreError>;
    fn upsert(&self, row: &DocRow) -> Result<(), StoreError>;
    fn delete(&self, doc_id: &str) -> Result<(), StoreError>;
    fn list_documents(&self) -> Result<Vec<DocRow>, StoreError>;
    fn get_index_signature(&self) -> Result<Option<String>, StoreError>;
    fn set_index_signature(&self, signature: &str) -> Result<(), StoreError>;
    fn clear_documents(&self) -> Result<(), StoreError>;
}

/// SQLite-backed `DocStore`. A single connection serialized behind a
/// mutex, matching the teacher's one-connection-per-service shape (§5).
pub struct SqliteDocStore {
    conn: Mutex<Connection>,
}

impl SqliteDocStore {
    pub fn open(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS docs (
                doc_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                title TEXT NOT NULL,
                version TEXT NOT NULL,
                checksum TEXT NOT NULL,
                chunk_ids_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn row_to_doc(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocRow> {
        let chunk_ids_json: String = row.get("chunk_ids_json")?;
        let chunk_ids: Vec<String> = serde_json::from_str(&chunk_ids_json).unwrap_or_default();
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(DocRow {
            doc_id: row.get("doc_id")?,
            path: row.get("path")?,
            title: row.get("title")?,
            version: row.get("version")?,
            checksum: row.get("checksum")?,
            chunk_ids,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

impl DocStore for SqliteDocStore {
    fn get_checksum(&self, doc_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let checksum = conn
            .query_row(
                "SELECT checksum FROM docs WHERE doc_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(checksum)
    }

    fn get_chunk_ids(&self, doc_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let json: Option<String> = conn
            .query_row(
                "SELECT chunk_ids_json FROM docs WHERE doc_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn get(&self, doc_id: &str) -> Result<Option<DocRow>, StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let row = conn
            .query_row("SELECT * FROM docs WHERE doc_id = ?1", params![doc_id], Self::row_to_doc)
            .optional()?;
        Ok(row)
    }

    fn upsert(&self, row: &DocRow) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let chunk_ids_json = serde_json::to_string(&row.chunk_ids)?;
        conn.execute(
            "INSERT INTO docs (doc_id, path, title, version, checksum, chunk_ids_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(doc_id) DO UPDATE SET
                path = excluded.path,
                title = excluded.title,
                version = excluded.version,
                checksum = excluded.checksum,
                chunk_ids_json = excluded.chunk_ids_json,
                updated_at = excluded.updated_at",
            params![
                row.doc_id,
                row.path,
                row.title,
                row.version,
                row.checksum,
                chunk_ids_json,
                row.created_at.to_rfc3339(),
                row.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, doc_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        conn.execute("DELETE FROM docs WHERE doc_id = ?1", params![doc_id])?;
        Ok(())
    }

    fn list_documents(&self) -> Result<Vec<DocRow>, StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let mut stmt = conn.prepare("SELECT * FROM docs ORDER BY doc_id")?;
        let rows = stmt
            .query_map([], Self::row_to_doc)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_index_signature(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![INDEX_SIGNATURE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_index_signature(&self, signature: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        conn.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![INDEX_SIGNATURE_KEY, signature],
        )?;
        Ok(())
    }

    fn clear_documents(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("doc store mutex poisoned");
        conn.execute("DELETE FROM docs", [])?;
        Ok(())
    }
}
