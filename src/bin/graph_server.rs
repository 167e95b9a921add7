//! Graph server binary entry point.
//!
//! Serves the similarity graph API over a pre-built database. Free-text
//! search is enabled when `OPENAI_API_KEY` is set.
//!
//! ```bash
//! graph_server --db-path papers.db --port 8000
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paper_graph::{
    embedding::{openai::OpenAIEmbedding, EmbeddingProvider},
    query::BruteForceSearchEngine,
    server::{AppState, GraphServer, ServerConfig},
    storage::{sqlite::SqliteEmbeddingStore, EmbeddingStore},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// HTTP server for similarity graphs over the paper database
#[derive(Parser, Debug)]
#[command(name = "graph_server", version, about = "Serve the paper similarity graph API")]
struct Args {
    /// Database file path
    #[arg(long, value_name = "PATH", env = "PAPER_GRAPH_DB", default_value = "papers.db")]
    db_path: PathBuf,

    /// Listen address
    #[arg(long, value_name = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(long, value_name = "PORT", env = "PAPER_GRAPH_PORT", default_value = "8000")]
    port: u16,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value = "30")]
    timeout: u64,

    /// Origin allowed by CORS (`*` for any)
    #[arg(long, value_name = "ORIGIN", default_value = "http://localhost:5173")]
    cors_origin: String,

    /// Disable `/search` even when OPENAI_API_KEY is set
    #[arg(long)]
    no_search: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    if !args.db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run the ingestion binary first to create the database.",
            args.db_path.display()
        );
    }

    let mut store = SqliteEmbeddingStore::new(args.db_path.clone());
    store
        .initialize()
        .await
        .with_context(|| "Failed to initialize storage")?;
    let stored_config = store
        .get_config()
        .await
        .with_context(|| "Failed to retrieve embedding configuration from database")?;
    let paper_count = store
        .count_papers()
        .await
        .with_context(|| "Failed to count papers in database")?;
    info!(path = %args.db_path.display(), papers = paper_count, "database opened");

    let store: Arc<dyn EmbeddingStore> = Arc::new(store);
    let mut state = AppState::new(Arc::clone(&store));

    if !args.no_search {
        let provider = OpenAIEmbedding::from_env(stored_config.as_ref().map(|c| c.model_name.clone()))
            .and_then(|provider| match &stored_config {
                Some(config) => provider.check_compatible(config).map(|()| provider),
                None => Ok(provider),
            });
        match provider {
            Ok(provider) => {
                info!(model = provider.model_name(), "text search enabled");
                state = state.with_search(Arc::new(BruteForceSearchEngine::new(provider, store)));
            }
            Err(e) => warn!(error = %e, "text search disabled"),
        }
    }

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        request_timeout_secs: args.timeout,
        cors_origin: args.cors_origin,
    };

    GraphServer::new(config, state)
        .run()
        .await
        .with_context(|| "Server terminated with an error")
}
