//! Text embedding providers.
//!
//! The similarity engine only consumes stored vectors. Components that turn
//! text into vectors (free-text search, corpus ingestion) receive an
//! [`EmbeddingProvider`] explicitly; there is no process-wide model instance.
//!
//! A provider is only usable against a corpus whose [`EmbeddingConfig`] it
//! matches: vectors from different models are not comparable.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Provider and corpus disagree on the model
    #[error("Embedding model mismatch: provider uses '{provider}' but storage has '{stored}'")]
    ModelMismatch { provider: String, stored: String },

    /// Vector length differs from the expected dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Turns summaries and queries into vectors.
///
/// ```ignore
/// let provider = OpenAIEmbedding::from_env(None)?;
/// provider.check_compatible(&stored_config)?;
/// let vector = provider.embed(&normalize_text("Graph neural networks")).await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one (pre-normalized) text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed several texts, preserving input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// The configuration a corpus embedded by this provider records.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }

    /// Whether vectors from this provider can be compared with a corpus
    /// stored under `stored`.
    ///
    /// # Errors
    /// `ModelMismatch` or `DimensionMismatch` naming both sides.
    fn check_compatible(&self, stored: &EmbeddingConfig) -> EmbeddingResult<()> {
        if self.model_name() != stored.model_name {
            return Err(EmbeddingError::ModelMismatch {
                provider: self.model_name().to_string(),
                stored: stored.model_name.clone(),
            });
        }
        check_dimension(stored.dimension, self.dimension())
    }
}

#[async_trait]
impl<T> EmbeddingProvider for std::sync::Arc<T>
where
    T: EmbeddingProvider + ?Sized,
{
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// `DimensionMismatch` unless `actual == expected`.
pub fn check_dimension(expected: usize, actual: usize) -> EmbeddingResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch { expected, actual })
    }
}

/// Lowercase and collapse whitespace. Used for embedding input and for
/// title deduplication.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
