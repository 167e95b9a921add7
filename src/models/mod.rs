//! Core data models for the paper similarity graph.
//!
//! This module contains the value objects that flow between the embedding
//! store, the similarity engine and the graph builder: paper identifiers,
//! embedding snapshots, similarity edges and ranked lookup results.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used when a paper has no stored summary.
pub const SUMMARY_PLACEHOLDER: &str = "No summary available.";

/// Identifier of a paper in the corpus.
///
/// Corpus papers use integer keys. Files uploaded by users are identified
/// by UUID strings and never have an entry in the embedding store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaperId {
    /// Integer database key
    Int(i64),

    /// String identifier (arXiv id, upload UUID, ...)
    Text(String),
}

impl PaperId {
    /// Whether this identifier names a user-uploaded file rather than a
    /// corpus paper.
    pub fn is_upload_id(&self) -> bool {
        match self {
            PaperId::Int(_) => false,
            PaperId::Text(text) => uuid::Uuid::parse_str(text.trim()).is_ok(),
        }
    }

    /// Turn numeric text ids (`"42"`) into integer ids; everything else is
    /// returned unchanged.
    pub fn canonical(self) -> Self {
        match self {
            PaperId::Text(text) => match text.trim().parse::<i64>() {
                Ok(id) => PaperId::Int(id),
                Err(_) => PaperId::Text(text),
            },
            id => id,
        }
    }

    /// The integer key, if this is an integer identifier.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PaperId::Int(id) => Some(*id),
            PaperId::Text(_) => None,
        }
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperId::Int(id) => write!(f, "{id}"),
            PaperId::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for PaperId {
    fn from(id: i64) -> Self {
        PaperId::Int(id)
    }
}

impl From<&str> for PaperId {
    fn from(id: &str) -> Self {
        PaperId::Text(id.to_string())
    }
}

impl From<String> for PaperId {
    fn from(id: String) -> Self {
        PaperId::Text(id)
    }
}

impl std::str::FromStr for PaperId {
    type Err = std::convert::Infallible;

    /// Numeric strings become integer ids, anything else a text id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<i64>() {
            Ok(id) => PaperId::Int(id),
            Err(_) => PaperId::Text(trimmed.to_string()),
        })
    }
}

/// Drop upload ids and repeated ids from a user selection, keeping the
/// caller's order.
///
/// Uploaded files have no stored embedding, so they must be removed before
/// the selection reaches the similarity engine.
pub fn filter_upload_ids(ids: &[PaperId]) -> Vec<PaperId> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| !id.is_upload_id())
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// Read-only snapshot of one paper's title, summary and embedding vector.
///
/// Fetched once per computation; nothing in the core mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperEmbedding {
    /// Paper identifier
    pub id: PaperId,

    /// Paper title
    pub title: String,

    /// Summary text, absent for some corpus entries
    #[serde(default)]
    pub summary: Option<String>,

    /// Embedding of the summary; the dimension is fixed by the encoding model
    pub embedding: Vec<f32>,
}

impl PaperEmbedding {
    pub fn new(
        id: impl Into<PaperId>,
        title: impl Into<String>,
        summary: Option<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary,
            embedding,
        }
    }

    /// The summary, or [`SUMMARY_PLACEHOLDER`] when none is stored.
    pub fn summary_or_placeholder(&self) -> &str {
        self.summary.as_deref().unwrap_or(SUMMARY_PLACEHOLDER)
    }
}

/// Node set produced by the similarity engine, keyed by paper id.
///
/// Every id referenced by a retained edge is a key; a key may have no edges.
pub type NodeSet = BTreeMap<PaperId, PaperEmbedding>;

/// A similarity link between two papers.
///
/// Only materialized when the score exceeds the active threshold, and never
/// between a paper and itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source: PaperId,
    pub target: PaperId,

    /// Raw cosine similarity in [-1, 1]
    pub similarity: f32,
}

impl SimilarityEdge {
    pub fn new(source: PaperId, target: PaperId, similarity: f32) -> Self {
        Self {
            source,
            target,
            similarity,
        }
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint.
    pub fn other(&self, id: &PaperId) -> Option<&PaperId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Relevance classification for ranked lookups.
///
/// Papers are categorized by their semantic similarity to the query paper or
/// query text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Anything lower
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used in API responses and tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// Paper metadata returned from ranked lookups, without the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub id: PaperId,
    pub title: String,
    pub summary: Option<String>,
}

impl From<&PaperEmbedding> for PaperSummary {
    fn from(paper: &PaperEmbedding) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            summary: paper.summary.clone(),
        }
    }
}

/// A ranked lookup result: a paper plus how close it is to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The paper metadata
    pub paper: PaperSummary,

    /// Cosine similarity score
    pub score: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl SearchResult {
    pub fn new(paper: PaperSummary, score: f32) -> Self {
        Self {
            paper,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

/// Configuration for the embedding model behind the stored vectors.
///
/// Persisted alongside the corpus so that every reader agrees on the vector
/// dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "text-embedding-3-small")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
