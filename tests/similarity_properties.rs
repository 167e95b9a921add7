//! Property tests for the similarity engine and the graph builder.

use std::collections::HashSet;

use paper_graph::config::{GraphConfig, ENGINE_SIMILARITY_THRESHOLD};
use paper_graph::models::{NodeSet, PaperEmbedding, PaperId};
use paper_graph::similarity::{cosine_similarity, SimilarityGraph};
use paper_graph::storage::memory::InMemoryEmbeddingStore;
use paper_graph::{GraphBuilder, SimilarityEngine};
use proptest::prelude::*;

const DIM: usize = 4;

fn arb_embedding() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, DIM)
}

/// A corpus of papers with ids `0..n` and a selection of seed ids from it.
fn arb_corpus_and_seeds() -> impl Strategy<Value = (Vec<PaperEmbedding>, Vec<PaperId>)> {
    proptest::collection::vec(arb_embedding(), 2..30).prop_flat_map(|vectors| {
        let n = vectors.len();
        let papers: Vec<PaperEmbedding> = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                PaperEmbedding::new(i as i64, format!("Paper title {i}"), Some(format!("Summary {i}")), v)
            })
            .collect();
        let seeds = proptest::collection::vec(0..n as i64, 1..6)
            .prop_map(|ids| ids.into_iter().map(PaperId::Int).collect::<Vec<_>>());
        (Just(papers), seeds)
    })
}

fn compute(papers: &[PaperEmbedding], seeds: &[PaperId], top_n: usize) -> SimilarityGraph {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let engine = SimilarityEngine::new(InMemoryEmbeddingStore::from_papers(papers.to_vec()));
        engine
            .compute_similarities(seeds, top_n, ENGINE_SIMILARITY_THRESHOLD)
            .await
            .unwrap()
    })
}

fn unordered(a: &PaperId, b: &PaperId) -> (PaperId, PaperId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

mod prop_cosine {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn cosine_is_symmetric_and_bounded(a in arb_embedding(), b in arb_embedding()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&ab));
        }
    }
}

mod prop_engine {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn edges_are_above_threshold_without_self_loops(
            (papers, seeds) in arb_corpus_and_seeds(),
            top_n in 1usize..8,
        ) {
            let result = compute(&papers, &seeds, top_n);

            for edge in &result.edges {
                prop_assert_ne!(&edge.source, &edge.target);
                prop_assert!(edge.similarity > ENGINE_SIMILARITY_THRESHOLD);
                prop_assert!(result.nodes.contains_key(&edge.source));
                prop_assert!(result.nodes.contains_key(&edge.target));
            }
        }

        #[test]
        fn each_seed_links_at_most_top_n_candidates(
            (papers, seeds) in arb_corpus_and_seeds(),
            top_n in 1usize..8,
        ) {
            let result = compute(&papers, &seeds, top_n);
            let seed_set: HashSet<&PaperId> = seeds.iter().collect();

            for seed in &seed_set {
                let candidate_edges = result
                    .edges
                    .iter()
                    .filter(|e| &&e.source == seed && !seed_set.contains(&e.target))
                    .count();
                prop_assert!(candidate_edges <= top_n);
            }
        }

        #[test]
        fn seeds_are_visible_unless_pool_is_empty(
            (papers, seeds) in arb_corpus_and_seeds(),
        ) {
            let result = compute(&papers, &seeds, 10);
            let seed_set: HashSet<&PaperId> = seeds.iter().collect();

            if seed_set.len() == papers.len() {
                prop_assert!(result.is_empty());
            } else {
                for seed in &seed_set {
                    prop_assert!(result.nodes.contains_key(*seed));
                }
                // Non-seed nodes are exactly the linked candidates.
                for id in result.nodes.keys().filter(|id| !seed_set.contains(id)) {
                    prop_assert!(result.edges.iter().any(|e| &e.target == id));
                }
            }
        }

        #[test]
        fn computation_is_deterministic(
            (papers, seeds) in arb_corpus_and_seeds(),
            top_n in 1usize..8,
        ) {
            let first = compute(&papers, &seeds, top_n);
            let second = compute(&papers, &seeds, top_n);
            prop_assert_eq!(first.edges, second.edges);
            prop_assert_eq!(
                first.nodes.keys().collect::<Vec<_>>(),
                second.nodes.keys().collect::<Vec<_>>()
            );
        }
    }
}

mod prop_graph {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn rendered_graph_is_closed_and_deduplicated(
            (papers, seeds) in arb_corpus_and_seeds(),
            top_n in 1usize..10,
        ) {
            let result = compute(&papers, &seeds, top_n);
            let graph = GraphBuilder::default().build_graph(&seeds, &result.nodes, &result.edges);

            let mut pairs = HashSet::new();
            for edge in &graph.edges {
                prop_assert_ne!(&edge.source, &edge.target);
                prop_assert!(graph.nodes.contains_key(&edge.source));
                prop_assert!(graph.nodes.contains_key(&edge.target));
                prop_assert!(pairs.insert(unordered(&edge.source, &edge.target)));
            }
            for (id, node) in &graph.nodes {
                prop_assert_eq!(node.is_seed, seeds.contains(id));
            }
        }

        #[test]
        fn non_seed_nodes_are_top_neighbors_of_a_seed(
            (papers, seeds) in arb_corpus_and_seeds(),
            neighbors in 1usize..4,
        ) {
            let result = compute(&papers, &seeds, 10);
            let config = GraphConfig::builder().neighbors_per_seed(neighbors).build().unwrap();
            let graph = GraphBuilder::new(config).build_graph(&seeds, &result.nodes, &result.edges);

            let non_seeds = graph.nodes.keys().filter(|id| !seeds.contains(id)).count();
            let distinct_seeds: HashSet<&PaperId> = seeds.iter().collect();
            prop_assert!(non_seeds <= distinct_seeds.len() * neighbors);

            for id in graph.nodes.keys().filter(|id| !seeds.contains(id)) {
                prop_assert!(result
                    .edges
                    .iter()
                    .any(|e| e.other(id).is_some_and(|other| seeds.contains(other))));
            }
        }

        #[test]
        fn rebuilding_from_rendered_edges_is_stable(
            (papers, seeds) in arb_corpus_and_seeds(),
        ) {
            let result = compute(&papers, &seeds, 10);
            let builder = GraphBuilder::default();
            let graph = builder.build_graph(&seeds, &result.nodes, &result.edges);

            let kept_nodes: NodeSet = result
                .nodes
                .iter()
                .filter(|(id, _)| graph.nodes.contains_key(*id))
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect();
            let kept_edges: Vec<_> = graph
                .edges
                .iter()
                .map(|e| paper_graph::SimilarityEdge::new(e.source.clone(), e.target.clone(), e.similarity))
                .collect();
            let again = builder.build_graph(&seeds, &kept_nodes, &kept_edges);
            prop_assert_eq!(again, graph);
        }
    }
}
