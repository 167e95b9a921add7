//! Graph binary entry point.
//!
//! Command-line access to the similarity engine and graph builder over a
//! pre-built database (or a JSON corpus file that already carries vectors).
//!
//! # Examples
//!
//! Build the graph around two selected papers:
//! ```bash
//! graph --db-path papers.db graph --seed 12 --seed 40
//! ```
//!
//! Closest papers to one paper, as JSON:
//! ```bash
//! graph --db-path papers.db --format json similar --paper 12 --limit 5
//! ```
//!
//! Free-text search (requires OPENAI_API_KEY):
//! ```bash
//! graph --db-path papers.db search --query "graph neural networks"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_graph::{
    config::{GraphConfig, SimilarityConfig},
    embedding::openai::OpenAIEmbedding,
    graph::{EdgeStrength, GraphBuilder, RenderGraph},
    models::{filter_upload_ids, PaperId, RelevanceLevel, SearchResult},
    provider::{json::JsonFilePaperProvider, PaperRecord},
    query::{BruteForceSearchEngine, SearchEngine, SearchQuery},
    storage::{
        memory::InMemoryEmbeddingStore, modal_dimension, sqlite::SqliteEmbeddingStore,
        EmbeddingStore,
    },
    SimilarityEngine, DEFAULT_EMBEDDING_MODEL,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly tables
    Table,
    /// Machine-readable JSON format
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the similarity graph around a selection of papers
    Graph {
        /// Selected paper id (repeatable); upload UUIDs are ignored
        #[arg(long = "seed", value_name = "ID", required = true)]
        seeds: Vec<String>,

        /// Candidates kept per seed before graph pruning
        #[arg(long, value_name = "N")]
        top_n: Option<usize>,

        /// Minimum similarity (exclusive) for an engine edge
        #[arg(long, value_name = "SCORE")]
        threshold: Option<f32>,

        /// Neighbours kept per seed in the rendered graph
        #[arg(long, value_name = "N")]
        neighbors: Option<usize>,
    },

    /// List the papers closest to one paper
    Similar {
        /// Paper id
        #[arg(long, value_name = "ID")]
        paper: String,

        /// Number of results to return
        #[arg(long, value_name = "N", default_value = "10")]
        limit: usize,
    },

    /// Free-text semantic search over the corpus
    Search {
        /// Search query
        #[arg(long, value_name = "TEXT")]
        query: String,

        /// Number of results to return
        #[arg(long, value_name = "N", default_value = "10")]
        top_k: usize,
    },
}

/// Graph CLI for querying the paper database
#[derive(Parser, Debug)]
#[command(
    name = "graph",
    version,
    about = "Similarity graphs and lookups over stored paper embeddings",
    long_about = "Query stored paper embeddings: build the relevance graph around a selection, \
                  list nearest papers, or run a free-text search.

EXAMPLES:
  Graph around a selection:
    graph --db-path papers.db graph --seed 12 --seed 40

  Graph from a JSON corpus with vectors:
    graph --corpus corpus.json graph --seed 1 --seed 2 --format json

  Nearest papers:
    graph --db-path papers.db similar --paper 12 --limit 5

  Free-text search:
    OPENAI_API_KEY=sk-... graph --db-path papers.db search --query \"contrastive learning\""
)]
struct Args {
    /// Database file path
    #[arg(long, value_name = "PATH", env = "PAPER_GRAPH_DB")]
    db_path: Option<PathBuf>,

    /// JSON corpus file whose records carry embeddings (loaded in memory)
    #[arg(long, value_name = "FILE")]
    corpus: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// An opened embedding store and the model its vectors came from.
struct OpenedStore {
    store: Arc<dyn EmbeddingStore>,
    model_name: String,
}

async fn open_sqlite(path: PathBuf) -> Result<OpenedStore> {
    if !path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run the ingestion binary first to create the database.",
            path.display()
        );
    }

    let mut store = SqliteEmbeddingStore::new(path);
    store
        .initialize()
        .await
        .with_context(|| "Failed to initialize storage")?;

    let model_name = match store
        .get_config()
        .await
        .with_context(|| "Failed to retrieve embedding configuration from database")?
    {
        Some(config) => {
            info!(model = %config.model_name, dimension = config.dimension, "using stored embedding config");
            config.model_name
        }
        None => {
            warn!("database has no embedding configuration; assuming the default model");
            DEFAULT_EMBEDDING_MODEL.to_string()
        }
    };

    let paper_count = store
        .count_papers()
        .await
        .with_context(|| "Failed to count papers in database")?;
    info!(papers = paper_count, "database opened");

    Ok(OpenedStore {
        store: Arc::new(store),
        model_name,
    })
}

async fn open_corpus(path: PathBuf) -> Result<OpenedStore> {
    let provider = JsonFilePaperProvider::from_file(path.clone())
        .await
        .with_context(|| format!("Failed to load corpus from {}", path.display()))?;

    let total = provider.records().len();
    let papers: Vec<_> = provider
        .records()
        .iter()
        .cloned()
        .filter_map(PaperRecord::into_embedding)
        .collect();
    if papers.len() < total {
        warn!(
            skipped = total - papers.len(),
            "corpus records without an embedding are ignored"
        );
    }
    let dimension = modal_dimension(papers.iter().map(|p| p.embedding.as_slice()))
        .with_context(|| format!("Corpus {} has no usable embeddings", path.display()))?;
    info!(papers = papers.len(), dimension, "corpus loaded in memory");

    Ok(OpenedStore {
        store: Arc::new(InMemoryEmbeddingStore::from_papers(papers).restrict_dimension(dimension)),
        model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn relevance_cell(relevance: RelevanceLevel) -> Cell {
    let color = match relevance {
        RelevanceLevel::Identical => Color::Green,
        RelevanceLevel::HighlySimilar => Color::Cyan,
        RelevanceLevel::Similar => Color::Yellow,
        RelevanceLevel::Relevant => Color::White,
    };
    Cell::new(relevance.as_str()).fg(color)
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

/// Format ranked results as a pretty table
fn format_results_table(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = new_table(&["Rank", "Id", "Title", "Relevance", "Score"]);
    for (idx, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&result.paper.id),
            Cell::new(truncate(&result.paper.title, 60)),
            relevance_cell(result.relevance),
            Cell::new(format!("{:.4}", result.score)),
        ]);
    }
    table.to_string()
}

/// Format a rendered graph as node and edge tables
fn format_graph_table(graph: &RenderGraph) -> String {
    if graph.is_empty() {
        return "No graph: none of the selected papers has related papers above the threshold."
            .to_string();
    }

    let mut nodes = new_table(&["Id", "Title", "Seed"]);
    for (id, node) in &graph.nodes {
        let title = node
            .tooltip
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Title: "))
            .unwrap_or_default();
        let seed = if node.is_seed {
            Cell::new("yes").fg(Color::Red)
        } else {
            Cell::new("")
        };
        nodes.add_row(vec![Cell::new(id), Cell::new(truncate(title, 60)), seed]);
    }

    let mut edges = new_table(&["Source", "Target", "Similarity"]);
    for edge in &graph.edges {
        let color = match EdgeStrength::from_similarity(edge.similarity) {
            EdgeStrength::Strong => Color::Green,
            EdgeStrength::Medium => Color::DarkYellow,
            EdgeStrength::Weak => Color::Grey,
        };
        edges.add_row(vec![
            Cell::new(&edge.source),
            Cell::new(&edge.target),
            Cell::new(format!("{:.4}", edge.similarity)).fg(color),
        ]);
    }

    format!("{nodes}\n{edges}")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| "Failed to serialize output to JSON")?;
    println!("{json}");
    Ok(())
}

async fn run_graph(
    store: Arc<dyn EmbeddingStore>,
    seeds: &[String],
    similarity: SimilarityConfig,
    graph_config: GraphConfig,
    format: OutputFormat,
) -> Result<()> {
    let ids: Vec<PaperId> = seeds
        .iter()
        .map(|s| PaperId::from(s.as_str()).canonical())
        .collect();
    let seeds = filter_upload_ids(&ids);
    debug!(seeds = ?seeds, "resolved selection");
    if seeds.is_empty() {
        anyhow::bail!("No corpus papers in the selection (upload ids are ignored).");
    }

    let start = Instant::now();
    let engine = SimilarityEngine::new(store);
    let result = engine
        .compute_with_config(&seeds, &similarity)
        .await
        .with_context(|| "Failed to compute similarities")?;
    let graph = GraphBuilder::new(graph_config).build_graph(&seeds, &result.nodes, &result.edges);
    let elapsed = start.elapsed();

    match format {
        OutputFormat::Table => {
            println!("{}", format_graph_table(&graph));
            println!(
                "\n{} nodes, {} edges in {:.2}s",
                graph.node_count(),
                graph.edge_count(),
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => print_json(&graph)?,
    }
    Ok(())
}

fn print_results(results: &[SearchResult], format: OutputFormat, started: Instant) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(results));
            println!(
                "\nFound {} results in {:.2}s",
                results.len(),
                started.elapsed().as_secs_f64()
            );
        }
        OutputFormat::Json => print_json(&results)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let opened = match (args.db_path, args.corpus) {
        (_, Some(corpus)) => open_corpus(corpus).await?,
        (Some(db_path), None) => open_sqlite(db_path).await?,
        (None, None) => anyhow::bail!(
            "Either --db-path (or PAPER_GRAPH_DB) or --corpus must be specified.\n\
             Use --help for usage information."
        ),
    };

    match args.command {
        Command::Graph {
            seeds,
            top_n,
            threshold,
            neighbors,
        } => {
            let defaults = SimilarityConfig::default();
            let similarity = SimilarityConfig::builder()
                .top_n(top_n.unwrap_or(defaults.top_n))
                .similarity_threshold(threshold.unwrap_or(defaults.similarity_threshold))
                .build()
                .with_context(|| "Invalid similarity parameters")?;
            let mut graph_config = GraphConfig::builder();
            if let Some(neighbors) = neighbors {
                graph_config = graph_config.neighbors_per_seed(neighbors);
            }
            let graph_config = graph_config
                .build()
                .with_context(|| "Invalid graph parameters")?;

            run_graph(opened.store, &seeds, similarity, graph_config, args.format).await
        }
        Command::Similar { paper, limit } => {
            let paper_id = PaperId::from(paper.as_str()).canonical();
            let start = Instant::now();
            let results = SimilarityEngine::new(opened.store)
                .find_similar(&paper_id, limit)
                .await
                .with_context(|| format!("Failed to find papers similar to {paper_id}"))?;
            print_results(&results, args.format, start)
        }
        Command::Search { query, top_k } => {
            let provider = OpenAIEmbedding::from_env(Some(opened.model_name))
                .with_context(|| "Free-text search needs an embedding provider")?;
            let engine = BruteForceSearchEngine::new(provider, opened.store);
            let start = Instant::now();
            let results = engine
                .search(&SearchQuery::new(query.clone(), Some(top_k)))
                .await
                .with_context(|| format!("Failed to execute search for query: '{query}'"))?;
            print_results(&results, args.format, start)
        }
    }
}
