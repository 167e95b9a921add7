//! Paper provider module.
//!
//! Sources of corpus records for the ingestion pipeline. A record carries
//! the paper's metadata and, optionally, a precomputed embedding; records
//! without one are embedded by the pipeline.
//!
//! Providers do not deduplicate. That is the pipeline's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PaperEmbedding, PaperId};

pub mod json;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// One corpus entry as supplied by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: PaperId,
    pub title: String,
    #[serde(default, alias = "abstract")]
    pub summary: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl PaperRecord {
    /// Convert into an embedding snapshot, if the record carries a vector.
    pub fn into_embedding(self) -> Option<PaperEmbedding> {
        let embedding = self.embedding?;
        Some(PaperEmbedding::new(self.id, self.title, self.summary, embedding))
    }
}

/// Trait for sourcing corpus records.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch all available records.
    ///
    /// # Errors
    /// Returns `ProviderError` if records cannot be fetched or parsed
    async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>>;

    /// Fetch at most `limit` records.
    async fn fetch_papers_limit(&self, limit: usize) -> ProviderResult<Vec<PaperRecord>> {
        let all_papers = self.fetch_papers().await?;
        Ok(all_papers.into_iter().take(limit).collect())
    }

    /// Total number of records available.
    async fn count_papers(&self) -> ProviderResult<usize> {
        self.fetch_papers().await.map(|papers| papers.len())
    }

    /// Human-readable name, for logging.
    fn name(&self) -> &str;
}
