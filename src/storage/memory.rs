//! In-memory embedding store.
//!
//! [`InMemoryEmbeddingStore`] keeps an insertion-ordered list of papers
//! behind a `tokio::sync::RwLock`. It backs the JSON corpus path of the CLI
//! and the tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use super::{validate_embedding, EmbeddingStore, StorageError, StorageResult};
use crate::models::{PaperEmbedding, PaperId};

/// An in-memory embedding store.
///
/// Papers are kept in insertion order, which is also the iteration order of
/// [`fetch_all_embeddings`](EmbeddingStore::fetch_all_embeddings).
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    papers: RwLock<Vec<PaperEmbedding>>,
    dimension: Option<usize>,
}

impl InMemoryEmbeddingStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that only serves vectors of the given dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            papers: RwLock::default(),
            dimension: Some(dimension),
        }
    }

    /// Create a store pre-filled with `papers`.
    ///
    /// Later entries with an id that is already present replace it in place.
    pub fn from_papers(papers: impl IntoIterator<Item = PaperEmbedding>) -> Self {
        let mut list: Vec<PaperEmbedding> = Vec::new();
        for paper in papers {
            upsert_into(&mut list, paper);
        }
        Self {
            papers: RwLock::new(list),
            dimension: None,
        }
    }

    /// Only serve vectors of `dimension`; others are skipped on read.
    pub fn restrict_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Insert or replace a paper.
    pub async fn upsert(&self, paper: PaperEmbedding) {
        let mut papers = self.papers.write().await;
        upsert_into(&mut papers, paper);
    }

    /// Number of stored papers, regardless of validity.
    pub async fn len(&self) -> usize {
        self.papers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.papers.read().await.is_empty()
    }

    fn is_servable(&self, paper: &PaperEmbedding) -> bool {
        match validate_embedding(&paper.id, &paper.embedding, self.dimension) {
            Ok(()) => true,
            Err(e) => {
                warn!(paper_id = %paper.id, error = %e, "skipping paper with malformed embedding");
                false
            }
        }
    }
}

fn upsert_into(list: &mut Vec<PaperEmbedding>, paper: PaperEmbedding) {
    match list.iter_mut().find(|p| p.id == paper.id) {
        Some(existing) => *existing = paper,
        None => list.push(paper),
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn fetch_embeddings(&self, ids: &[PaperId]) -> StorageResult<Vec<PaperEmbedding>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let papers = self.papers.read().await;
        Ok(papers
            .iter()
            .filter(|p| ids.contains(&p.id))
            .filter(|p| self.is_servable(p))
            .cloned()
            .collect())
    }

    async fn fetch_all_embeddings(
        &self,
        excluding: &[PaperId],
    ) -> StorageResult<Vec<PaperEmbedding>> {
        let papers = self.papers.read().await;
        Ok(papers
            .iter()
            .filter(|p| p.summary.is_some())
            .filter(|p| !excluding.contains(&p.id))
            .filter(|p| self.is_servable(p))
            .cloned()
            .collect())
    }

    async fn get_paper(&self, id: &PaperId) -> StorageResult<PaperEmbedding> {
        let papers = self.papers.read().await;
        papers
            .iter()
            .find(|p| &p.id == id)
            .filter(|p| self.is_servable(p))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Paper {id} not found")))
    }
}
