//! OpenAI embedding provider implementation.
//!
//! Calls the `/v1/embeddings` endpoint directly with `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{check_dimension, EmbeddingError, EmbeddingProvider, EmbeddingResult};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default model, matching [`crate::DEFAULT_EMBEDDING_MODEL`].
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// OpenAI embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: reqwest::Client,

    /// OpenAI API key for authentication
    api_key: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// Endpoint, overridable for compatible gateways
    endpoint: String,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    pub fn new(api_key: String, model: Option<String>) -> EmbeddingResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::ConfigError("API key must not be empty".to_string()));
        }

        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            embedding_dimension,
            endpoint: OPENAI_EMBEDDINGS_URL.to_string(),
        })
    }

    /// Create a provider from the `OPENAI_API_KEY` environment variable.
    pub fn from_env(model: Option<String>) -> EmbeddingResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbeddingError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key, model)
    }

    /// Send requests to a different endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ApiError("API returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        debug!(model = %self.model, batch_size = texts.len(), "requesting embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts.to_vec(),
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed");
                EmbeddingError::ApiError(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(%status, "embedding API error");
            return Err(EmbeddingError::ApiError(format!("API returned {status}: {detail}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("failed to parse response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::ApiError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        for data in &parsed.data {
            check_dimension(self.embedding_dimension, data.embedding.len())?;
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
