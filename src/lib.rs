//! Paper Graph - semantic similarity graphs over research-paper embeddings.
//!
//! Given a user's selection of papers, the library finds their nearest
//! neighbours in the corpus by cosine similarity of stored summary
//! embeddings and turns the result into a small, styled graph ready for
//! visualization.
//!
//! # Architecture
//!
//! - **models**: Core data structures (PaperId, PaperEmbedding, SimilarityEdge, ...)
//! - **config**: Tunable parameters of the engine and the graph builder
//! - **storage**: Embedding store accessor (in-memory and SQLite)
//! - **similarity**: Seed-seed and seed-candidate similarity passes
//! - **graph**: Relevance pruning and render styling
//! - **embedding**: Text embedding providers
//! - **query**: Free-text search over the corpus
//! - **provider** / **ingestion**: Loading a corpus into SQLite
//! - **server**: HTTP API
//!
//! # Workflow
//!
//! 1. Caller supplies the selected paper ids (uploaded files are filtered out)
//! 2. The store resolves seed and candidate embeddings
//! 3. The similarity engine computes edges above the threshold
//! 4. The graph builder prunes to the relevance neighborhood and styles it
//!
//! # Example
//!
//! ```ignore
//! use paper_graph::{GraphBuilder, PaperId, SimilarityEngine};
//! use paper_graph::storage::sqlite::SqliteEmbeddingStore;
//!
//! let mut store = SqliteEmbeddingStore::new("papers.db");
//! store.initialize().await?;
//!
//! let seeds = vec![PaperId::Int(12), PaperId::Int(40)];
//! let engine = SimilarityEngine::new(store);
//! let similarity = engine.compute_similarities(&seeds, 10, 0.65).await?;
//! let graph = GraphBuilder::default().build_graph(&seeds, &similarity.nodes, &similarity.edges);
//! println!("{}", serde_json::to_string_pretty(&graph)?);
//! ```

pub mod config;
pub mod embedding;
pub mod graph;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod server;
pub mod similarity;
pub mod storage;

// Re-export commonly used types at the crate root
pub use config::{GraphConfig, SimilarityConfig};
pub use embedding::EmbeddingProvider;
pub use graph::{GraphBuilder, RenderGraph};
pub use models::{EmbeddingConfig, PaperEmbedding, PaperId, RelevanceLevel, SearchResult, SimilarityEdge};
pub use query::{SearchEngine, SearchQuery};
pub use similarity::{SimilarityEngine, SimilarityGraph};
pub use storage::EmbeddingStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
