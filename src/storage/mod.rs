//! Embedding store abstraction and implementations.
//!
//! This module defines the accessor the similarity engine reads paper
//! embeddings through. The core never writes: each call returns a fresh,
//! read-only snapshot. Backends decide how vectors are persisted; the
//! shared [`parse_embedding`] helper validates text-encoded vectors at the
//! boundary so that malformed records are skipped instead of failing a
//! whole computation.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{PaperEmbedding, PaperId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A stored vector could not be parsed or has the wrong shape
    #[error("Malformed embedding for paper {id}: {reason}")]
    MalformedEmbedding { id: String, reason: String },

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate entry (e.g., same title already exists)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to paper embeddings.
///
/// Both fetch operations silently omit ids that are unknown or whose stored
/// vector is malformed. Only connectivity-style failures are returned as
/// errors, and callers treat those as fatal for the current computation.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Resolve the given ids.
    ///
    /// Returns one entry per resolvable id, in store order. Papers without
    /// a stored summary are still returned (their summary is `None`).
    async fn fetch_embeddings(&self, ids: &[PaperId]) -> StorageResult<Vec<PaperEmbedding>>;

    /// Every paper with a non-null summary and embedding, minus `excluding`.
    ///
    /// The returned order is stable for an unchanged snapshot; the engine
    /// relies on it to break ranking ties.
    async fn fetch_all_embeddings(&self, excluding: &[PaperId])
        -> StorageResult<Vec<PaperEmbedding>>;

    /// Resolve a single paper.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the id has no resolvable embedding
    async fn get_paper(&self, id: &PaperId) -> StorageResult<PaperEmbedding> {
        self.fetch_embeddings(std::slice::from_ref(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(format!("Paper {id} not found")))
    }
}

#[async_trait]
impl<T> EmbeddingStore for Arc<T>
where
    T: EmbeddingStore + ?Sized,
{
    async fn fetch_embeddings(&self, ids: &[PaperId]) -> StorageResult<Vec<PaperEmbedding>> {
        (**self).fetch_embeddings(ids).await
    }

    async fn fetch_all_embeddings(
        &self,
        excluding: &[PaperId],
    ) -> StorageResult<Vec<PaperEmbedding>> {
        (**self).fetch_all_embeddings(excluding).await
    }

    async fn get_paper(&self, id: &PaperId) -> StorageResult<PaperEmbedding> {
        (**self).get_paper(id).await
    }
}

/// Parse a text-encoded embedding such as `"[0.12, -0.5, 0.33]"`.
///
/// This is the format pgvector and JSON both produce. The vector must be
/// non-empty, contain only finite numbers and, when `expected_dimension` is
/// given, have exactly that many components.
///
/// # Errors
/// Returns `StorageError::MalformedEmbedding`; callers skip the record.
pub fn parse_embedding(
    id: &PaperId,
    text: &str,
    expected_dimension: Option<usize>,
) -> StorageResult<Vec<f32>> {
    let malformed = |reason: String| StorageError::MalformedEmbedding {
        id: id.to_string(),
        reason,
    };

    let vector: Vec<f32> =
        serde_json::from_str(text.trim()).map_err(|e| malformed(format!("not a numeric vector: {e}")))?;

    validate_embedding(id, &vector, expected_dimension)?;
    Ok(vector)
}

/// Check an already-decoded vector against the same rules as
/// [`parse_embedding`].
pub fn validate_embedding(
    id: &PaperId,
    vector: &[f32],
    expected_dimension: Option<usize>,
) -> StorageResult<()> {
    let malformed = |reason: String| StorageError::MalformedEmbedding {
        id: id.to_string(),
        reason,
    };

    if vector.is_empty() {
        return Err(malformed("empty vector".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(malformed("non-finite component".to_string()));
    }
    if let Some(expected) = expected_dimension {
        if vector.len() != expected {
            return Err(malformed(format!(
                "dimension {} does not match expected {}",
                vector.len(),
                expected
            )));
        }
    }
    Ok(())
}

/// The most common non-zero vector length, or `None` for no vectors.
///
/// Ties go to the smaller length, so the answer does not depend on order.
pub fn modal_dimension<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for vector in vectors {
        if !vector.is_empty() {
            *counts.entry(vector.len()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (len, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((len, count)),
        })
        .map(|(len, _)| len)
}

/// Encode a vector in the text form accepted by [`parse_embedding`].
pub fn format_embedding(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}
