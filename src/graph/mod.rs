//! Graph filter and builder.
//!
//! Turns the engine's node set and edge list into a [`RenderGraph`]: the
//! relevance neighborhood of the seeds (each seed plus its strongest
//! neighbours), styled for display. Serializing the graph into a visual
//! artifact is left to the consumer.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::GraphConfig;
use crate::models::{NodeSet, PaperEmbedding, PaperId, SimilarityEdge};

pub const SEED_NODE_COLOR: &str = "red";
pub const NODE_COLOR: &str = "lightblue";
pub const SEED_FONT_SIZE: u32 = 24;
pub const NODE_FONT_SIZE: u32 = 22;
pub const NODE_SHAPE: &str = "ellipse";

pub const MISSING_ABSTRACT: &str = "No abstract available.";
pub const MISSING_TITLE: &str = "No title";

/// Display weight per unit of similarity.
const EDGE_WEIGHT_SCALE: f32 = 10.0;

/// Colour tier of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStrength {
    /// similarity > 0.85
    Strong,
    /// similarity > 0.75
    Medium,
    Weak,
}

impl EdgeStrength {
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity > 0.85 {
            EdgeStrength::Strong
        } else if similarity > 0.75 {
            EdgeStrength::Medium
        } else {
            EdgeStrength::Weak
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            EdgeStrength::Strong => "green",
            EdgeStrength::Medium => "orange",
            EdgeStrength::Weak => "gray",
        }
    }
}

/// A styled node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub label: String,
    /// Hover text: title and wrapped summary
    pub tooltip: String,
    pub color: &'static str,
    pub font_size: u32,
    pub shape: &'static str,
    pub is_seed: bool,
}

/// A styled edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub source: PaperId,
    pub target: PaperId,
    /// Raw cosine similarity
    pub similarity: f32,
    /// similarity x 10
    pub weight: f32,
    pub tooltip: String,
    pub color: &'static str,
}

/// Display-ready graph. Every edge references two keys of `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderGraph {
    pub nodes: BTreeMap<PaperId, RenderNode>,
    pub edges: Vec<RenderEdge>,
}

impl RenderGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Prunes and styles similarity graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Build the render graph for `seed_ids`.
    ///
    /// With no seeds the input is rendered as is. Otherwise only the seeds
    /// and their `neighbors_per_seed` strongest neighbours above the
    /// threshold survive, together with the above-threshold edges among
    /// them. Self-loops and repeated pairs are collapsed, keeping the first
    /// occurrence.
    pub fn build_graph(
        &self,
        seed_ids: &[PaperId],
        nodes: &NodeSet,
        edges: &[SimilarityEdge],
    ) -> RenderGraph {
        let seeds: HashSet<&PaperId> = seed_ids.iter().collect();

        let (kept_nodes, kept_edges): (Vec<&PaperEmbedding>, Vec<&SimilarityEdge>) =
            if seeds.is_empty() {
                (nodes.values().collect(), edges.iter().collect())
            } else {
                let relevant = self.relevant_ids(seed_ids, edges);
                let threshold = self.config.similarity_threshold;
                (
                    nodes.values().filter(|n| relevant.contains(&n.id)).collect(),
                    edges
                        .iter()
                        .filter(|e| {
                            relevant.contains(&e.source)
                                && relevant.contains(&e.target)
                                && e.similarity > threshold
                        })
                        .collect(),
                )
            };

        let mut graph = RenderGraph::default();
        for node in kept_nodes {
            let is_seed = seeds.contains(&node.id);
            graph.nodes.insert(node.id.clone(), self.render_node(node, is_seed));
        }

        let mut seen_pairs = HashSet::new();
        for edge in kept_edges {
            if edge.source == edge.target {
                continue;
            }
            if !graph.nodes.contains_key(&edge.source) || !graph.nodes.contains_key(&edge.target) {
                debug!(source = %edge.source, target = %edge.target, "dropping edge with missing endpoint");
                continue;
            }
            let pair = if edge.source <= edge.target {
                (&edge.source, &edge.target)
            } else {
                (&edge.target, &edge.source)
            };
            if seen_pairs.insert(pair) {
                graph.edges.push(render_edge(edge));
            }
        }

        debug!(
            seeds = seeds.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "render graph built"
        );
        graph
    }

    /// Seeds plus each seed's strongest neighbours above the threshold.
    fn relevant_ids<'a>(
        &self,
        seed_ids: &'a [PaperId],
        edges: &'a [SimilarityEdge],
    ) -> HashSet<&'a PaperId> {
        let threshold = self.config.similarity_threshold;
        let mut relevant: HashSet<&PaperId> = seed_ids.iter().collect();

        for seed in seed_ids {
            let mut neighbors: Vec<(&PaperId, f32)> = edges
                .iter()
                .filter(|e| e.source != e.target && e.similarity > threshold)
                .filter_map(|e| e.other(seed).map(|other| (other, e.similarity)))
                .collect();
            neighbors.sort_by(|a, b| b.1.total_cmp(&a.1));
            relevant.extend(
                neighbors
                    .into_iter()
                    .take(self.config.neighbors_per_seed)
                    .map(|(id, _)| id),
            );
        }
        relevant
    }

    fn render_node(&self, node: &PaperEmbedding, is_seed: bool) -> RenderNode {
        let title = if node.title.trim().is_empty() {
            MISSING_TITLE
        } else {
            node.title.as_str()
        };
        let summary = node.summary.as_deref().unwrap_or(MISSING_ABSTRACT);
        let wrapped = textwrap::wrap(summary, self.config.wrap_width).join("\n");

        RenderNode {
            label: format!("Paper {}", node.id),
            tooltip: format!("Title: {title}\nSummary: {wrapped}"),
            color: if is_seed { SEED_NODE_COLOR } else { NODE_COLOR },
            font_size: if is_seed { SEED_FONT_SIZE } else { NODE_FONT_SIZE },
            shape: NODE_SHAPE,
            is_seed,
        }
    }
}

fn render_edge(edge: &SimilarityEdge) -> RenderEdge {
    RenderEdge {
        source: edge.source.clone(),
        target: edge.target.clone(),
        similarity: edge.similarity,
        weight: edge.similarity * EDGE_WEIGHT_SCALE,
        tooltip: format!("Similarity: {:.2}", edge.similarity),
        color: EdgeStrength::from_similarity(edge.similarity).color(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64) -> PaperEmbedding {
        PaperEmbedding::new(id, format!("Title {id}"), Some(format!("Summary {id}")), vec![1.0])
    }

    fn node_set(ids: &[i64]) -> NodeSet {
        ids.iter().map(|&id| (PaperId::Int(id), node(id))).collect()
    }

    fn edge(a: i64, b: i64, sim: f32) -> SimilarityEdge {
        SimilarityEdge::new(PaperId::Int(a), PaperId::Int(b), sim)
    }

    fn pairs(graph: &RenderGraph) -> Vec<(PaperId, PaperId)> {
        graph
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect()
    }

    #[test]
    fn test_prunes_to_relevance_neighborhood() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(
            &[PaperId::Int(1)],
            &node_set(&[1, 2, 3]),
            &[edge(1, 2, 0.9), edge(1, 3, 0.5), edge(2, 3, 0.95)],
        );

        assert_eq!(graph.nodes.keys().cloned().collect::<Vec<_>>(), vec![PaperId::Int(1), PaperId::Int(2)]);
        assert_eq!(pairs(&graph), vec![(PaperId::Int(1), PaperId::Int(2))]);
        assert_eq!(graph.edges[0].similarity, 0.9);
    }

    #[test]
    fn test_keeps_top_neighbors_per_seed() {
        let builder = GraphBuilder::default();
        let edges: Vec<SimilarityEdge> = (2..=9).map(|id| edge(1, id, 0.66 + id as f32 * 0.01)).collect();
        let graph = builder.build_graph(&[PaperId::Int(1)], &node_set(&[1, 2, 3, 4, 5, 6, 7, 8, 9]), &edges);

        let kept: Vec<i64> = graph.nodes.keys().filter_map(PaperId::as_int).collect();
        assert_eq!(kept, vec![1, 5, 6, 7, 8, 9]);
        assert_eq!(graph.edge_count(), 5);
    }

    #[test]
    fn test_graph_threshold_is_strict() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&[PaperId::Int(1)], &node_set(&[1, 2]), &[edge(1, 2, 0.65)]);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_styling() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(
            &[PaperId::Int(1)],
            &node_set(&[1, 2, 3, 4]),
            &[edge(1, 2, 0.9), edge(1, 3, 0.8), edge(1, 4, 0.7)],
        );

        let seed = &graph.nodes[&PaperId::Int(1)];
        assert_eq!(seed.label, "Paper 1");
        assert_eq!(seed.color, "red");
        assert_eq!(seed.font_size, 24);
        assert_eq!(seed.tooltip, "Title: Title 1\nSummary: Summary 1");

        let other = &graph.nodes[&PaperId::Int(2)];
        assert_eq!(other.color, "lightblue");
        assert_eq!(other.font_size, 22);
        assert!(!other.is_seed);

        let colors: Vec<&str> = graph.edges.iter().map(|e| e.color).collect();
        assert_eq!(colors, vec!["green", "orange", "gray"]);
        assert_eq!(graph.edges[0].tooltip, "Similarity: 0.90");
        assert!((graph.edges[1].weight - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_placeholders_and_wrapping() {
        let builder = GraphBuilder::new(GraphConfig::builder().wrap_width(10).build().unwrap());
        let mut nodes = NodeSet::new();
        nodes.insert(PaperId::Int(1), PaperEmbedding::new(1, "", None, vec![1.0]));
        nodes.insert(
            PaperId::Int(2),
            PaperEmbedding::new(2, "T", Some("alpha beta gamma delta".into()), vec![1.0]),
        );

        let graph = builder.build_graph(&[], &nodes, &[]);
        assert_eq!(
            graph.nodes[&PaperId::Int(1)].tooltip,
            "Title: No title\nSummary: No abstract available."
        );
        assert_eq!(
            graph.nodes[&PaperId::Int(2)].tooltip,
            "Title: T\nSummary: alpha beta\ngamma\ndelta"
        );
    }

    #[test]
    fn test_no_seeds_renders_everything() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&[], &node_set(&[1, 2, 3]), &[edge(1, 2, 0.3), edge(2, 3, 0.9)]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.nodes.values().all(|n| !n.is_seed));
    }

    #[test]
    fn test_collapses_duplicates_and_keeps_closure() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(
            &[PaperId::Int(1), PaperId::Int(2)],
            &node_set(&[1, 2]),
            &[edge(1, 2, 0.9), edge(2, 1, 0.8), edge(1, 1, 1.0), edge(2, 7, 0.99)],
        );
        // 7 is a relevant neighbour of 2 but has no node entry.
        assert_eq!(pairs(&graph), vec![(PaperId::Int(1), PaperId::Int(2))]);
        assert_eq!(graph.edges[0].similarity, 0.9);
        for e in &graph.edges {
            assert!(graph.nodes.contains_key(&e.source) && graph.nodes.contains_key(&e.target));
        }
    }

    #[test]
    fn test_everything_pruned_is_empty_graph() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&[PaperId::Int(5)], &node_set(&[1, 2]), &[edge(1, 2, 0.9)]);
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_render_graph_serializes() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&[PaperId::Int(1)], &node_set(&[1, 2]), &[edge(1, 2, 0.9)]);
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["nodes"]["1"]["color"], "red");
        assert_eq!(json["edges"][0]["color"], "green");
    }
}
