//! SQLite storage implementation.
//!
//! This module provides a SQLite-backed [`EmbeddingStore`]. Embeddings are
//! stored as text-encoded vectors (`"[0.1,0.2,...]"`) and validated with
//! [`parse_embedding`] on the way out.
//!
//! rusqlite is synchronous, so every call opens a fresh connection on the
//! blocking thread pool. Each request therefore reads its own snapshot and no
//! connection state is shared between requests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{format_embedding, parse_embedding, EmbeddingStore, StorageError, StorageResult};
use crate::embedding::normalize_text;
use crate::models::{EmbeddingConfig, PaperEmbedding, PaperId};

const CONFIG_KEY_EMBEDDING: &str = "embedding";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS papers (
        id               INTEGER PRIMARY KEY,
        title            TEXT NOT NULL,
        normalized_title TEXT NOT NULL,
        summary          TEXT,
        embedding        TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_papers_normalized_title
        ON papers (normalized_title);
";

/// SQLite-based embedding storage.
///
/// # Schema
/// - `config`: key/value pairs; `embedding` holds the JSON [`EmbeddingConfig`]
/// - `papers`: `(id, title, normalized_title, summary, embedding)`
///
/// Only integer paper ids exist in this store; text ids are never resolved.
#[derive(Debug, Clone)]
pub struct SqliteEmbeddingStore {
    /// Path to the SQLite database file
    db_path: PathBuf,

    /// Expected vector dimension, loaded from the `config` table
    dimension: Option<usize>,
}

/// Raw row as read from the `papers` table.
struct PaperRow {
    id: i64,
    title: String,
    summary: Option<String>,
    embedding: Option<String>,
}

fn query_error(e: rusqlite::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

impl SqliteEmbeddingStore {
    /// Create a store for the given database file. No I/O happens until the
    /// first call.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            dimension: None,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The vector dimension enforced on reads, if known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Create the schema if needed and load the stored embedding config.
    ///
    /// Idempotent; safe to call on an existing database.
    pub async fn initialize(&mut self) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(|e| StorageError::SchemaError(e.to_string()))
        })
        .await?;

        self.dimension = self.get_config().await?.map(|c| c.dimension);
        debug!(path = %self.db_path.display(), dimension = ?self.dimension, "sqlite store initialized");
        Ok(())
    }

    /// Persist the embedding configuration and start enforcing its dimension.
    pub async fn store_config(&mut self, config: &EmbeddingConfig) -> StorageResult<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![CONFIG_KEY_EMBEDDING, value],
            )
            .map_err(query_error)?;
            Ok(())
        })
        .await?;
        self.dimension = Some(config.dimension);
        Ok(())
    }

    /// Retrieve the embedding configuration, if one was stored.
    pub async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        let value: Option<String> = self
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT value FROM config WHERE key = ?1",
                    params![CONFIG_KEY_EMBEDDING],
                    |row| row.get(0),
                )
                .optional()
                .map_err(query_error)
            })
            .await?;

        value
            .map(|v| {
                serde_json::from_str(&v).map_err(|e| StorageError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    /// Insert a paper and return its id.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if the id is already taken and
    /// `StorageError::Other` for non-integer ids
    pub async fn insert_paper(&self, paper: &PaperEmbedding) -> StorageResult<i64> {
        let id = paper.id.as_int().ok_or_else(|| {
            StorageError::Other(format!("sqlite store requires integer ids, got '{}'", paper.id))
        })?;
        let title = paper.title.clone();
        let normalized_title = normalize_text(&paper.title);
        let summary = paper.summary.clone();
        let embedding = format_embedding(&paper.embedding);

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO papers (id, title, normalized_title, summary, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, title, normalized_title, summary, embedding],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::DuplicateEntry(format!("Paper {id} already exists"))
                }
                other => query_error(other),
            })?;
            Ok(id)
        })
        .await
    }

    /// Check whether a paper with the given normalized title exists.
    pub async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
        let normalized_title = normalized_title.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM papers WHERE normalized_title = ?1)",
                params![normalized_title],
                |row| row.get(0),
            )
            .map_err(query_error)
        })
        .await
    }

    /// Total number of stored papers, with or without embeddings.
    pub async fn count_papers(&self) -> StorageResult<usize> {
        let count: i64 = self
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))
                    .map_err(query_error)
            })
            .await?;
        Ok(count as usize)
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(|e| {
                StorageError::ConnectionError(format!("failed to open {}: {e}", path.display()))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Other(format!("storage task failed: {e}")))?
    }

    async fn select_rows(&self, sql: String, ids: Vec<i64>) -> StorageResult<Vec<PaperRow>> {
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), |row| {
                    Ok(PaperRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        summary: row.get(2)?,
                        embedding: row.get(3)?,
                    })
                })
                .map_err(query_error)?;
            let decoded = rows.collect::<Result<Vec<_>, _>>().map_err(query_error);
            decoded
        })
        .await
    }

    /// Decode rows, skipping missing and malformed embeddings.
    fn decode_rows(&self, rows: Vec<PaperRow>) -> Vec<PaperEmbedding> {
        rows.into_iter()
            .filter_map(|row| {
                let id = PaperId::Int(row.id);
                let Some(text) = row.embedding else {
                    debug!(paper_id = %id, "skipping paper without embedding");
                    return None;
                };
                match parse_embedding(&id, &text, self.dimension) {
                    Ok(embedding) => Some(PaperEmbedding {
                        id,
                        title: row.title,
                        summary: row.summary,
                        embedding,
                    }),
                    Err(e) => {
                        warn!(paper_id = %id, error = %e, "skipping paper with malformed embedding");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingStore for SqliteEmbeddingStore {
    async fn fetch_embeddings(&self, ids: &[PaperId]) -> StorageResult<Vec<PaperEmbedding>> {
        let int_ids: Vec<i64> = ids.iter().filter_map(PaperId::as_int).collect();
        if int_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; int_ids.len()].join(",");
        let sql = format!(
            "SELECT id, title, summary, embedding FROM papers WHERE id IN ({placeholders}) ORDER BY id"
        );
        let rows = self.select_rows(sql, int_ids).await?;
        Ok(self.decode_rows(rows))
    }

    async fn fetch_all_embeddings(
        &self,
        excluding: &[PaperId],
    ) -> StorageResult<Vec<PaperEmbedding>> {
        let sql = "SELECT id, title, summary, embedding FROM papers
                   WHERE summary IS NOT NULL AND embedding IS NOT NULL
                   ORDER BY id"
            .to_string();
        let rows = self.select_rows(sql, Vec::new()).await?;

        let excluded: HashSet<&PaperId> = excluding.iter().collect();
        Ok(self
            .decode_rows(rows)
            .into_iter()
            .filter(|p| !excluded.contains(&p.id))
            .collect())
    }
}
