//! HTTP server module.
//!
//! Exposes the similarity engine and graph builder over a small JSON API:
//!
//! | Method | Path                              | Body                              |
//! |--------|-----------------------------------|-----------------------------------|
//! | POST   | `/generate-graph-from-selection`  | `[{"id": .., "title": ..}, ..]`   |
//! | POST   | `/find-similar`                   | `{"paper": {"id": ..}}`           |
//! | POST   | `/search`                         | `{"query": .., "maxResults": ..}` |
//! | GET    | `/health`                         |                                   |
//!
//! Errors are returned as `{"error": "..."}` with a matching status code.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{GraphConfig, SimilarityConfig};
use crate::graph::{GraphBuilder, RenderGraph};
use crate::models::{filter_upload_ids, PaperId, SearchResult};
use crate::query::{QueryError, SearchEngine, SearchQuery};
use crate::similarity::{SimilarityEngine, SimilarityError};
use crate::storage::EmbeddingStore;

/// Number of papers `/find-similar` returns when the request sets no limit.
pub const DEFAULT_SIMILAR_LIMIT: usize = 1;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The feature needs a collaborator that is not configured
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Similarity computation failed
    #[error("Similarity computation failed: {0}")]
    Similarity(#[from] SimilarityError),

    /// Search execution failed
    #[error("Search failed: {0}")]
    Search(QueryError),

    /// Server initialization error
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl From<QueryError> for ServerError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidQuery(msg) => ServerError::InvalidRequest(msg),
            other => ServerError::Search(other),
        }
    }
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Similarity(SimilarityError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Similarity(_) | ServerError::Search(_) | ServerError::InitializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// One entry of a graph selection. Other fields (title, summary) are
/// accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedPaper {
    pub id: PaperId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperRef {
    pub id: PaperId,
}

/// Request payload for `/find-similar`.
#[derive(Debug, Clone, Deserialize)]
pub struct FindSimilarRequest {
    pub paper: PaperRef,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A ranked paper in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperResultDto {
    pub id: PaperId,
    pub title: String,
    pub summary: Option<String>,

    /// Cosine similarity score
    pub score: f32,

    /// Relevance level as a string (e.g., "IDENTICAL", "HIGHLY_SIMILAR")
    pub relevance: String,
}

impl From<SearchResult> for PaperResultDto {
    fn from(result: SearchResult) -> Self {
        Self {
            id: result.paper.id,
            title: result.paper.title,
            summary: result.paper.summary,
            score: result.score,
            relevance: result.relevance.as_str().to_string(),
        }
    }
}

/// Response payload for `/find-similar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSimilarResponse {
    pub similar_papers: Vec<PaperResultDto>,
}

/// Request payload for `/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "maxResults", default)]
    pub max_results: Option<usize>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Origin allowed by CORS; `*` allows any
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 30,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parsed listen address.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::InitializationError(format!("invalid host/port: {e}")))
    }

    fn timeout_layer(&self) -> TimeoutLayer {
        TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(self.request_timeout_secs),
        )
    }

    fn cors_layer(&self) -> ServerResult<CorsLayer> {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
        if self.cors_origin == "*" {
            return Ok(layer.allow_origin(Any));
        }
        let origin = HeaderValue::from_str(&self.cors_origin).map_err(|e| {
            ServerError::InitializationError(format!("invalid CORS origin '{}': {e}", self.cors_origin))
        })?;
        Ok(layer.allow_origin(origin))
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<SimilarityEngine<Arc<dyn EmbeddingStore>>>,
    builder: GraphBuilder,
    similarity: SimilarityConfig,
    search: Option<Arc<dyn SearchEngine>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("similarity", &self.similarity)
            .field("graph", self.builder.config())
            .field("search_enabled", &self.search.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            engine: Arc::new(SimilarityEngine::new(store)),
            builder: GraphBuilder::default(),
            similarity: SimilarityConfig::default(),
            search: None,
        }
    }

    /// Enable `/search`.
    pub fn with_search(mut self, search: Arc<dyn SearchEngine>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_similarity_config(mut self, config: SimilarityConfig) -> Self {
        self.similarity = config;
        self
    }

    pub fn with_graph_config(mut self, config: GraphConfig) -> Self {
        self.builder = GraphBuilder::new(config);
        self
    }
}

/// Build the router with its middleware stack.
pub fn app_router(state: AppState, config: &ServerConfig) -> ServerResult<Router> {
    Ok(Router::new()
        .route("/health", get(health))
        .route("/generate-graph-from-selection", post(generate_graph))
        .route("/find-similar", post(find_similar))
        .route("/search", post(search))
        .with_state(state)
        .layer(config.timeout_layer())
        .layer(config.cors_layer()?)
        .layer(TraceLayer::new_for_http()))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "paper-graph", "version": crate::VERSION }))
}

async fn generate_graph(
    State(state): State<AppState>,
    Json(papers): Json<Vec<SelectedPaper>>,
) -> ServerResult<Json<RenderGraph>> {
    let started = Instant::now();
    let selected: Vec<PaperId> = papers.into_iter().map(|p| p.id.canonical()).collect();
    let seed_ids = filter_upload_ids(&selected);

    let similarity = state
        .engine
        .compute_with_config(&seed_ids, &state.similarity)
        .await?;
    let computed = Instant::now();
    let graph = state
        .builder
        .build_graph(&seed_ids, &similarity.nodes, &similarity.edges);

    info!(
        selected = selected.len(),
        seeds = seed_ids.len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        similarity_ms = computed.duration_since(started).as_millis() as u64,
        build_ms = computed.elapsed().as_millis() as u64,
        "graph generated"
    );
    Ok(Json(graph))
}

async fn find_similar(
    State(state): State<AppState>,
    Json(request): Json<FindSimilarRequest>,
) -> ServerResult<Json<FindSimilarResponse>> {
    let limit = request.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    if limit == 0 {
        return Err(ServerError::InvalidRequest("limit must be greater than zero".to_string()));
    }
    let paper_id = request.paper.id.canonical();

    let similar_papers = match state.engine.find_similar(&paper_id, limit).await {
        Ok(results) => results.into_iter().map(PaperResultDto::from).collect(),
        Err(SimilarityError::NotFound(_)) => {
            info!(paper_id = %paper_id, "paper not found, returning no similar papers");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(FindSimilarResponse { similar_papers }))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ServerResult<Json<Vec<PaperResultDto>>> {
    let Some(engine) = state.search.as_ref() else {
        return Err(ServerError::Unavailable(
            "text search requires an embedding provider".to_string(),
        ));
    };
    if request.max_results == Some(0) {
        return Err(ServerError::InvalidRequest("maxResults must be greater than zero".to_string()));
    }

    let query = SearchQuery::new(request.query, request.max_results);
    let results = engine.search(&query).await?;
    Ok(Json(results.into_iter().map(PaperResultDto::from).collect()))
}

/// HTTP server instance.
pub struct GraphServer {
    config: ServerConfig,
    state: AppState,
}

impl GraphServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// # Errors
    /// Returns `ServerError::InitializationError` if the address is invalid
    /// or cannot be bound
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.socket_addr()?;
        let app = app_router(self.state, &self.config)?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::InitializationError(format!("failed to bind {addr}: {e}")))?;
        info!(%addr, "paper-graph server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::InitializationError(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
