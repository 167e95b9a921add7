//! Text search over the stored corpus.
//!
//! The query text is normalized and embedded with the injected
//! [`EmbeddingProvider`], then scored against every stored paper in a single
//! pass over the stacked [`EmbeddingMatrix`]. Results come back sorted by
//! descending similarity and truncated to `top_k`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_graph::embedding::openai::OpenAIEmbedding;
//! use paper_graph::query::{BruteForceSearchEngine, SearchEngine, SearchQuery};
//! use paper_graph::storage::sqlite::SqliteEmbeddingStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let embedding_provider = OpenAIEmbedding::from_env(None)?;
//! let mut store = SqliteEmbeddingStore::new("papers.db");
//! store.initialize().await?;
//!
//! let search_engine = BruteForceSearchEngine::new(embedding_provider, store);
//! let query = SearchQuery::new("graph neural networks".to_string(), Some(5));
//! for result in search_engine.search(&query).await? {
//!     println!("{} - Score: {:.3}", result.paper.title, result.score);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{PaperSummary, SearchResult};
use crate::similarity::{rank_descending, EmbeddingMatrix};
use crate::storage::EmbeddingStore;

/// Default number of search results.
pub const DEFAULT_TOP_K: usize = 10;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The search query text (will be normalized and embedded)
    pub query: String,

    /// Maximum number of results to return
    pub top_k: usize,
}

impl SearchQuery {
    /// Create a new search query; `top_k` defaults to [`DEFAULT_TOP_K`].
    pub fn new(query: String, top_k: Option<usize>) -> Self {
        Self {
            query,
            top_k: top_k.unwrap_or(DEFAULT_TOP_K),
        }
    }
}

/// Trait for search and ranking engines.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search query and return ranked results, highest score first.
    ///
    /// # Errors
    /// Returns `QueryError` if the query is empty, or embedding or storage
    /// access fails.
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchResult>>;
}

/// Brute-force search engine: scores the query against every stored paper.
pub struct BruteForceSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: EmbeddingStore,
{
    /// Embedding provider for query embedding
    embedding_provider: E,

    /// Store holding the corpus vectors
    store: S,
}

impl<E, S> BruteForceSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: EmbeddingStore,
{
    pub fn new(embedding_provider: E, store: S) -> Self {
        Self {
            embedding_provider,
            store,
        }
    }
}

#[async_trait]
impl<E, S> SearchEngine for BruteForceSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: EmbeddingStore,
{
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchResult>> {
        let normalized_query = normalize_text(&query.query);
        if normalized_query.is_empty() {
            return Err(QueryError::InvalidQuery("query text is empty".to_string()));
        }

        let query_embedding = self
            .embedding_provider
            .embed(&normalized_query)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        let mut papers = self
            .store
            .fetch_all_embeddings(&[])
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;
        papers.retain(|p| {
            let keep = p.embedding.len() == query_embedding.len();
            if !keep {
                warn!(
                    paper_id = %p.id,
                    expected = query_embedding.len(),
                    actual = p.embedding.len(),
                    "skipping paper with mismatched embedding dimension"
                );
            }
            keep
        });

        let matrix = EmbeddingMatrix::stack(papers.iter().map(|p| p.embedding.as_slice()))
            .map_err(|e| QueryError::StorageError(e.to_string()))?;
        let scores = matrix
            .similarities_to(&query_embedding)
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        let results: Vec<SearchResult> = rank_descending(&scores, query.top_k)
            .into_iter()
            .map(|idx| SearchResult::new(PaperSummary::from(&papers[idx]), scores[idx]))
            .collect();

        debug!(
            query = %normalized_query,
            scanned = papers.len(),
            returned = results.len(),
            "search complete"
        );
        Ok(results)
    }
}
