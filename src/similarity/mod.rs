//! Similarity engine.
//!
//! Given a selection of seed papers, the engine resolves their embeddings
//! and the candidate pool through an [`EmbeddingStore`], then runs two
//! passes:
//!
//! 1. **Seed-seed**: pairwise cosine similarity among the seeds; every pair
//!    `i < j` above the threshold becomes an edge.
//! 2. **Seed-candidate**: each seed is scored against the stacked candidate
//!    matrix in one pass, the top `top_n` candidates are kept and those above
//!    the threshold become edges. Seeds are independent, so a candidate may
//!    be linked from several seeds.
//!
//! The node set holds every resolved seed plus each candidate that made it
//! into an edge. Nothing is cached between calls.

mod matrix;

pub use matrix::{cosine_similarity, EmbeddingMatrix, SimilarityMatrix};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SimilarityConfig;
use crate::models::{NodeSet, PaperEmbedding, PaperId, PaperSummary, SearchResult, SimilarityEdge};
use crate::storage::{modal_dimension, EmbeddingStore, StorageError};

/// Errors that can occur while computing similarities.
#[derive(Debug, Error)]
pub enum SimilarityError {
    /// The embedding store failed; fatal for the current computation
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The requested paper has no resolvable embedding
    #[error("Paper not found: {0}")]
    NotFound(PaperId),

    /// Vectors of different lengths were combined
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for similarity operations.
pub type SimilarityResult<T> = Result<T, SimilarityError>;

/// Nodes and weighted edges produced by one computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarityGraph {
    pub nodes: NodeSet,
    pub edges: Vec<SimilarityEdge>,
}

impl SimilarityGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Indices of the `limit` highest scores, highest first.
///
/// The sort is stable, so equal scores keep their original order. NaN
/// scores rank last.
pub(crate) fn rank_descending(scores: &[f32], limit: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    let key = |i: usize| if scores[i].is_nan() { f32::NEG_INFINITY } else { scores[i] };
    order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
    order.truncate(limit);
    order
}

/// Drop papers whose vector length differs from `dimension`.
fn retain_dimension(papers: &mut Vec<PaperEmbedding>, dimension: usize, pool: &'static str) {
    papers.retain(|p| {
        let keep = p.embedding.len() == dimension;
        if !keep {
            warn!(
                paper_id = %p.id,
                pool,
                expected = dimension,
                actual = p.embedding.len(),
                "skipping paper with mismatched embedding dimension"
            );
        }
        keep
    });
}

/// Computes similarity edges for a seed selection.
///
/// The engine owns no state beyond its store handle; concurrent calls are
/// independent.
pub struct SimilarityEngine<S>
where
    S: EmbeddingStore,
{
    store: S,
}

impl<S> SimilarityEngine<S>
where
    S: EmbeddingStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// [`compute_similarities`](Self::compute_similarities) with parameters
    /// taken from `config`.
    pub async fn compute_with_config(
        &self,
        seed_ids: &[PaperId],
        config: &SimilarityConfig,
    ) -> SimilarityResult<SimilarityGraph> {
        self.compute_similarities(seed_ids, config.top_n, config.similarity_threshold)
            .await
    }

    /// Compute the node set and similarity edges around `seed_ids`.
    ///
    /// Seeds without a resolvable embedding are dropped silently. Edges are
    /// only created for similarity strictly greater than `threshold`, and
    /// each seed contributes at most `top_n` candidate edges.
    ///
    /// When the candidate pool is empty the result is empty, seeds included:
    /// callers must read that as "no graph".
    ///
    /// # Errors
    /// Returns `SimilarityError::Storage` if the store cannot be read.
    pub async fn compute_similarities(
        &self,
        seed_ids: &[PaperId],
        top_n: usize,
        threshold: f32,
    ) -> SimilarityResult<SimilarityGraph> {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let requested: Vec<PaperId> = seed_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();
        if requested.is_empty() {
            debug!("no seeds requested");
            return Ok(SimilarityGraph::default());
        }

        // Resolve seeds, keeping the caller's order.
        let mut resolved: HashMap<PaperId, PaperEmbedding> = self
            .store
            .fetch_embeddings(&requested)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let mut seeds: Vec<PaperEmbedding> =
            requested.iter().filter_map(|id| resolved.remove(id)).collect();

        if seeds.is_empty() {
            debug!(requested = requested.len(), "none of the seeds has an embedding");
            return Ok(SimilarityGraph::default());
        }

        let mut candidates = self.store.fetch_all_embeddings(&requested).await?;
        let requested_set: HashSet<&PaperId> = requested.iter().collect();
        candidates.retain(|c| !requested_set.contains(&c.id));

        // The length most papers share wins; odd ones out are skipped.
        let vectors = seeds.iter().chain(&candidates).map(|p| p.embedding.as_slice());
        if let Some(dimension) = modal_dimension(vectors) {
            retain_dimension(&mut seeds, dimension, "seed");
            retain_dimension(&mut candidates, dimension, "candidate");
        }
        if seeds.is_empty() {
            debug!("no seed shares the corpus embedding dimension");
            return Ok(SimilarityGraph::default());
        }
        let loaded = Instant::now();
        debug!(
            seeds = seeds.len(),
            candidates = candidates.len(),
            elapsed_ms = loaded.duration_since(started).as_millis() as u64,
            "loaded embeddings"
        );

        if candidates.is_empty() {
            info!(seeds = seeds.len(), "candidate pool is empty, returning no graph");
            return Ok(SimilarityGraph::default());
        }

        let mut edges = Vec::new();

        let seed_matrix = EmbeddingMatrix::stack(seeds.iter().map(|s| s.embedding.as_slice()))?;
        for (i, j, sim) in seed_matrix.self_similarity().upper_triangle() {
            if sim > threshold {
                edges.push(SimilarityEdge::new(seeds[i].id.clone(), seeds[j].id.clone(), sim));
            }
        }
        let seed_pass = Instant::now();
        debug!(
            edges = edges.len(),
            elapsed_ms = seed_pass.duration_since(loaded).as_millis() as u64,
            "seed-seed pass done"
        );

        let candidate_matrix =
            EmbeddingMatrix::stack(candidates.iter().map(|c| c.embedding.as_slice()))?;
        let mut linked: HashSet<usize> = HashSet::new();
        for seed in &seeds {
            let sims = candidate_matrix.similarities_to(&seed.embedding)?;
            for idx in rank_descending(&sims, top_n) {
                let sim = sims[idx];
                if sim > threshold {
                    edges.push(SimilarityEdge::new(seed.id.clone(), candidates[idx].id.clone(), sim));
                    linked.insert(idx);
                }
            }
        }
        let candidate_pass = Instant::now();
        debug!(
            edges = edges.len(),
            elapsed_ms = candidate_pass.duration_since(seed_pass).as_millis() as u64,
            "seed-candidate pass done"
        );

        let mut nodes = NodeSet::new();
        for (idx, candidate) in candidates.into_iter().enumerate() {
            if linked.contains(&idx) {
                nodes.insert(candidate.id.clone(), candidate);
            }
        }
        for mut seed in seeds {
            if seed.summary.is_none() {
                seed.summary = Some(seed.summary_or_placeholder().to_string());
            }
            nodes.insert(seed.id.clone(), seed);
        }

        info!(
            nodes = nodes.len(),
            edges = edges.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "similarity computation finished"
        );
        Ok(SimilarityGraph { nodes, edges })
    }

    /// The `limit` papers closest to `paper_id`, most similar first.
    ///
    /// No threshold is applied; the paper itself is never returned.
    ///
    /// # Errors
    /// Returns `SimilarityError::NotFound` if `paper_id` has no resolvable
    /// embedding, or `SimilarityError::Storage` if the store fails.
    pub async fn find_similar(
        &self,
        paper_id: &PaperId,
        limit: usize,
    ) -> SimilarityResult<Vec<SearchResult>> {
        let paper = match self.store.get_paper(paper_id).await {
            Ok(paper) => paper,
            Err(StorageError::NotFound(_)) => return Err(SimilarityError::NotFound(paper_id.clone())),
            Err(e) => return Err(e.into()),
        };

        let mut pool = self
            .store
            .fetch_all_embeddings(std::slice::from_ref(paper_id))
            .await?;
        pool.retain(|p| &p.id != paper_id);
        retain_dimension(&mut pool, paper.embedding.len(), "candidate");

        let matrix = EmbeddingMatrix::stack(pool.iter().map(|p| p.embedding.as_slice()))?;
        let sims = matrix.similarities_to(&paper.embedding)?;
        let results: Vec<SearchResult> = rank_descending(&sims, limit)
            .into_iter()
            .map(|idx| SearchResult::new(PaperSummary::from(&pool[idx]), sims[idx]))
            .collect();

        debug!(paper_id = %paper_id, results = results.len(), "find_similar done");
        Ok(results)
    }
}
