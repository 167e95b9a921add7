//! Tunable parameters of the similarity engine and the graph builder.
//!
//! The engine threshold and the graph threshold start from the same value
//! but are separate settings: changing one never moves the other.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of candidate neighbours each seed may contribute.
pub const DEFAULT_TOP_N: usize = 10;

/// Minimum cosine similarity for the engine to materialize an edge.
pub const ENGINE_SIMILARITY_THRESHOLD: f32 = 0.65;

/// Minimum cosine similarity for an edge to survive graph pruning.
pub const GRAPH_SIMILARITY_THRESHOLD: f32 = 0.65;

/// Strongest neighbours kept per seed when pruning the graph.
pub const DEFAULT_NEIGHBORS_PER_SEED: usize = 5;

/// Line width used to wrap summaries in node tooltips.
pub const DEFAULT_WRAP_WIDTH: usize = 80;

/// Configuration validation failure.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within [-1, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
}

fn check_threshold(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { field, value });
    }
    Ok(())
}

/// Parameters of [`SimilarityEngine::compute_similarities`](crate::similarity::SimilarityEngine::compute_similarities).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Candidates ranked per seed before thresholding.
    pub top_n: usize,
    /// Strict lower bound on edge similarity.
    pub similarity_threshold: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            similarity_threshold: ENGINE_SIMILARITY_THRESHOLD,
        }
    }
}

impl SimilarityConfig {
    pub fn builder() -> SimilarityConfigBuilder {
        SimilarityConfigBuilder::default()
    }
}

/// Builder for a validated [`SimilarityConfig`].
#[derive(Debug, Clone, Default)]
pub struct SimilarityConfigBuilder {
    config: SimilarityConfig,
}

impl SimilarityConfigBuilder {
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.config.top_n = top_n;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if `top_n == 0` or the threshold is outside [-1, 1].
    pub fn build(self) -> Result<SimilarityConfig, ConfigError> {
        if self.config.top_n == 0 {
            return Err(ConfigError::Zero { field: "top_n" });
        }
        check_threshold("similarity_threshold", self.config.similarity_threshold)?;
        Ok(self.config)
    }
}

/// Parameters of the graph filter and builder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Strict lower bound on similarity for neighbours and surviving edges.
    pub similarity_threshold: f32,
    /// Strongest neighbours kept per seed.
    pub neighbors_per_seed: usize,
    /// Tooltip summary line width, in characters.
    pub wrap_width: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: GRAPH_SIMILARITY_THRESHOLD,
            neighbors_per_seed: DEFAULT_NEIGHBORS_PER_SEED,
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl GraphConfig {
    pub fn builder() -> GraphConfigBuilder {
        GraphConfigBuilder::default()
    }
}

/// Builder for a validated [`GraphConfig`].
#[derive(Debug, Clone, Default)]
pub struct GraphConfigBuilder {
    config: GraphConfig,
}

impl GraphConfigBuilder {
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn neighbors_per_seed(mut self, count: usize) -> Self {
        self.config.neighbors_per_seed = count;
        self
    }

    pub fn wrap_width(mut self, width: usize) -> Self {
        self.config.wrap_width = width;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if a count is zero or the threshold is outside [-1, 1].
    pub fn build(self) -> Result<GraphConfig, ConfigError> {
        if self.config.neighbors_per_seed == 0 {
            return Err(ConfigError::Zero { field: "neighbors_per_seed" });
        }
        if self.config.wrap_width == 0 {
            return Err(ConfigError::Zero { field: "wrap_width" });
        }
        check_threshold("similarity_threshold", self.config.similarity_threshold)?;
        Ok(self.config)
    }
}
