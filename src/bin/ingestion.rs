//! Ingestion pipeline binary entry point.
//!
//! Loads a JSON corpus into the SQLite embedding store. Records that carry a
//! vector are stored as is; records without one are embedded from their
//! summary when an embedding provider is configured.
//!
//! # Examples
//!
//! Initialize a new database from precomputed vectors:
//! ```bash
//! ingestion --mode init-new --input corpus.json --db-path papers.db
//! ```
//!
//! Add papers to an existing database, embedding missing vectors:
//! ```bash
//! OPENAI_API_KEY=sk-... ingestion --input new_papers.json --embedding-provider openai
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use indicatif::{ProgressBar, ProgressStyle};
use paper_graph::{
    embedding::{openai::OpenAIEmbedding, EmbeddingProvider},
    ingestion::{IngestionPipeline, IngestionStats},
    models::EmbeddingConfig,
    provider::{json::JsonFilePaperProvider, PaperProvider},
    storage::sqlite::SqliteEmbeddingStore,
    DEFAULT_EMBEDDING_MODEL,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the ingestion pipeline
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to existing database and validate embedding config (default)
    Connect,
    /// Initialize new database with fresh schema
    InitNew,
}

/// Embedding provider type
#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
enum EmbeddingProviderType {
    /// No provider: only records with a precomputed vector are ingested
    None,
    /// OpenAI embeddings API (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
}

/// Ingestion pipeline CLI for building and updating the paper database
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build and update the paper embedding database",
    long_about = "Ingestion pipeline for loading research papers and their summary embeddings \
                  into the database used by the graph tools.

EXAMPLES:
  Initialize new database from precomputed vectors:
    ingestion --mode init-new --input corpus.json --db-path papers.db

  Add papers to existing database:
    ingestion --input new_papers.json

  Embed summaries with OpenAI:
    OPENAI_API_KEY=sk-... ingestion --mode init-new --input papers.json --embedding-provider openai

  Custom batch size and logging:
    ingestion --input papers.json --batch-size 50 --log-level debug"
)]
struct IngestionArgs {
    /// Input JSON file containing paper records
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Database file path
    #[arg(long, value_name = "PATH", env = "PAPER_GRAPH_DB", default_value = "papers.db")]
    db_path: PathBuf,

    /// Operation mode: connect to existing DB or initialize new DB
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Provider used for records without a vector
    #[arg(long, value_enum, default_value = "none")]
    embedding_provider: EmbeddingProviderType,

    /// Embedding model name recorded in (or checked against) the database
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// Vector dimension for a new database without a provider; inferred from
    /// the first record with a vector when omitted
    #[arg(long, value_name = "N")]
    dimension: Option<usize>,

    /// Number of records to process per batch
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Create the embedding provider selected on the command line, if any
fn create_embedding_provider(args: &IngestionArgs) -> Result<Option<OpenAIEmbedding>> {
    if args.embedding_provider == EmbeddingProviderType::None {
        info!("no embedding provider; records without a vector will be skipped");
        return Ok(None);
    }

    let provider = OpenAIEmbedding::from_env(args.embedding_model.clone()).context(
        "OPENAI_API_KEY environment variable must be set when using the OpenAI provider",
    )?;
    info!(
        model = provider.model_name(),
        dimension = provider.dimension(),
        "OpenAI provider initialized"
    );
    Ok(Some(provider))
}

/// Create storage instance, making sure the parent directory exists
fn create_storage(db_path: &Path) -> Result<SqliteEmbeddingStore> {
    debug!(path = %db_path.display(), "creating SQLite storage");

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
            info!(dir = %parent.display(), "created database directory");
        }
    }

    Ok(SqliteEmbeddingStore::new(db_path))
}

/// Embedding configuration for a new database
fn new_database_config(
    args: &IngestionArgs,
    provider: Option<&OpenAIEmbedding>,
    provider_records: &JsonFilePaperProvider,
) -> Result<EmbeddingConfig> {
    if let Some(provider) = provider {
        return Ok(provider.config());
    }

    let dimension = match args.dimension {
        Some(dimension) => dimension,
        None => provider_records
            .records()
            .iter()
            .find_map(|r| r.embedding.as_ref().map(Vec::len))
            .context("Cannot infer the vector dimension: no record carries an embedding. Pass --dimension.")?,
    };

    Ok(EmbeddingConfig {
        model_name: args
            .embedding_model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        dimension,
    })
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers | Inserted: {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

fn print_summary(stats: &IngestionStats, elapsed: std::time::Duration) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Ingestion completed", ""]);
    table.add_row(vec![Cell::new("Total processed"), Cell::new(stats.total_processed)]);
    table.add_row(vec![Cell::new("Inserted"), Cell::new(stats.inserted)]);
    table.add_row(vec![Cell::new("Duplicates skipped"), Cell::new(stats.duplicates_skipped)]);
    table.add_row(vec![Cell::new("Missing embedding"), Cell::new(stats.missing_embedding)]);
    table.add_row(vec![Cell::new("Failed"), Cell::new(stats.failed)]);
    table.add_row(vec![Cell::new("Elapsed time"), Cell::new(format!("{elapsed:.2?}"))]);
    println!("\n{table}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestionArgs::parse();
    init_logging(&args.log_level);

    info!("starting paper ingestion pipeline");
    debug!(?args, "CLI arguments");

    let start_time = Instant::now();

    if !args.input.exists() {
        error!(input = %args.input.display(), "input file does not exist");
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let provider = JsonFilePaperProvider::from_file(args.input.clone())
        .await
        .with_context(|| format!("Failed to load papers from {}", args.input.display()))?;

    let paper_count = provider.count_papers().await?;
    info!(records = paper_count, source = provider.name(), "corpus loaded");

    let embedding_provider = create_embedding_provider(&args)?;
    let storage = create_storage(&args.db_path)?;

    let mut pipeline = match args.mode {
        Mode::Connect => IngestionPipeline::connect(storage, embedding_provider, Some(args.batch_size))
            .await
            .context("Failed to connect to existing database. Use --mode init-new to create a new database.")?,
        Mode::InitNew => {
            let config = new_database_config(&args, embedding_provider.as_ref(), &provider)?;
            IngestionPipeline::initialize_new(storage, config, embedding_provider, Some(args.batch_size))
                .await
                .context("Failed to initialize new database")?
        }
    };

    if paper_count == 0 {
        warn!("no papers found in input file");
        return Ok(());
    }

    let progress = create_progress_bar(paper_count);
    progress.set_message("0");

    let records = provider.fetch_papers().await?;
    let bar = progress.clone();
    let stats = pipeline
        .ingest_batch_with_progress(&records, move |stats| {
            bar.set_position(stats.total_processed as u64);
            bar.set_message(stats.inserted.to_string());
        })
        .await
        .context("Failed to ingest papers")?;

    progress.finish_with_message(stats.inserted.to_string());
    print_summary(&stats, start_time.elapsed());

    if stats.failed > 0 {
        warn!(failed = stats.failed, "some papers failed to process - check logs for details");
    }
    if stats.missing_embedding > 0 {
        warn!(
            missing = stats.missing_embedding,
            "records without a vector were skipped; use --embedding-provider openai to embed them"
        );
    }

    info!("ingestion pipeline completed successfully");
    Ok(())
}
