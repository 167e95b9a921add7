//! Ingestion pipeline module.
//!
//! Loads corpus records into a [`SqliteEmbeddingStore`]: titles are
//! normalized for deduplication, records without a vector have their summary
//! embedded through the optional [`EmbeddingProvider`], and every vector is
//! validated against the stored [`EmbeddingConfig`] before it is written.
//!
//! # Usage Patterns
//!
//! ## Primary: adding papers to an existing database
//!
//! ```ignore
//! let store = SqliteEmbeddingStore::new("papers.db");
//! let provider = OpenAIEmbedding::from_env(None).ok();
//! let mut pipeline = IngestionPipeline::connect(store, provider, None).await?;
//!
//! let corpus = JsonFilePaperProvider::from_file("new_papers.json").await?;
//! let stats = pipeline.ingest_from_provider(&corpus).await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! ## Secondary: creating a new database
//!
//! ```ignore
//! let config = EmbeddingConfig { model_name: "text-embedding-3-small".into(), dimension: 1536 };
//! let mut pipeline = IngestionPipeline::initialize_new(store, config, provider, None).await?;
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{EmbeddingConfig, PaperEmbedding};
use crate::provider::{PaperProvider, PaperRecord, ProviderError};
use crate::storage::sqlite::SqliteEmbeddingStore;
use crate::storage::{validate_embedding, StorageError};

/// Default number of records per embedding batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Invalid input data or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate paper detected
    #[error("Duplicate paper: {0}")]
    Duplicate(String),
}

impl From<StorageError> for IngestionError {
    fn from(e: StorageError) -> Self {
        IngestionError::StorageError(e.to_string())
    }
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of input records processed
    pub total_processed: usize,

    /// Number of papers successfully inserted
    pub inserted: usize,

    /// Number of records skipped due to deduplication
    pub duplicates_skipped: usize,

    /// Records with neither a vector nor an embeddable summary
    pub missing_embedding: usize,

    /// Number of records that failed validation or insertion
    pub failed: usize,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_missing_embedding(&mut self) {
        self.total_processed += 1;
        self.missing_embedding += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }
}

/// Ingestion pipeline coordinator.
///
/// The embedding provider is optional: without one, only records that
/// already carry a vector can be ingested.
pub struct IngestionPipeline<E>
where
    E: EmbeddingProvider,
{
    /// Provider for records that lack a vector
    embedding_provider: Option<E>,

    /// Destination store
    store: SqliteEmbeddingStore,

    /// Batch size for embedding generation
    batch_size: usize,
}

impl<E> IngestionPipeline<E>
where
    E: EmbeddingProvider,
{
    fn check_provider(provider: Option<&E>, stored: &EmbeddingConfig) -> IngestionResult<()> {
        match provider {
            Some(provider) => provider
                .check_compatible(stored)
                .map_err(|e| IngestionError::InvalidInput(e.to_string())),
            None => Ok(()),
        }
    }

    /// Connect to an existing database and prepare for ingestion.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the database has no
    /// embedding configuration or the provider does not match it.
    pub async fn connect(
        mut store: SqliteEmbeddingStore,
        embedding_provider: Option<E>,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        store.initialize().await?;

        let stored_config = store.get_config().await?.ok_or_else(|| {
            IngestionError::InvalidInput(
                "Storage has no embedding configuration. Use initialize_new() for new storage."
                    .to_string(),
            )
        })?;
        Self::check_provider(embedding_provider.as_ref(), &stored_config)?;

        info!(
            path = %store.db_path().display(),
            model = %stored_config.model_name,
            dimension = stored_config.dimension,
            "connected to existing database"
        );
        Ok(Self {
            embedding_provider,
            store,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        })
    }

    /// Initialize a database with `config` and prepare for ingestion.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the provider does not
    /// match `config`, or a storage error if the schema cannot be created.
    pub async fn initialize_new(
        mut store: SqliteEmbeddingStore,
        config: EmbeddingConfig,
        embedding_provider: Option<E>,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        if config.dimension == 0 {
            return Err(IngestionError::InvalidInput(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }
        Self::check_provider(embedding_provider.as_ref(), &config)?;

        store.initialize().await?;
        store.store_config(&config).await?;

        info!(
            path = %store.db_path().display(),
            model = %config.model_name,
            dimension = config.dimension,
            "initialized new database"
        );
        Ok(Self {
            embedding_provider,
            store,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        })
    }

    pub fn store(&self) -> &SqliteEmbeddingStore {
        &self.store
    }

    /// Ingest a batch of records.
    ///
    /// Storage failures on individual inserts are counted, not returned;
    /// an embedding failure aborts the run.
    pub async fn ingest_batch(&mut self, records: &[PaperRecord]) -> IngestionResult<IngestionStats> {
        self.ingest_batch_with_progress(records, |_| {}).await
    }

    /// [`ingest_batch`](Self::ingest_batch), calling `on_progress` after
    /// every chunk.
    pub async fn ingest_batch_with_progress<F>(
        &mut self,
        records: &[PaperRecord],
        mut on_progress: F,
    ) -> IngestionResult<IngestionStats>
    where
        F: FnMut(&IngestionStats) + Send,
    {
        let mut stats = IngestionStats::new();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for chunk in records.chunks(self.batch_size) {
            let mut ready: Vec<PaperEmbedding> = Vec::new();
            let mut pending: Vec<&PaperRecord> = Vec::new();

            for record in chunk {
                let normalized_title = Self::normalize_title(&record.title);
                if normalized_title.is_empty() {
                    warn!(paper_id = %record.id, "skipping record with empty title");
                    stats.record_failed();
                    continue;
                }
                if seen_titles.contains(&normalized_title)
                    || self.store.exists_by_title(&normalized_title).await?
                {
                    stats.record_duplicate();
                    continue;
                }
                seen_titles.insert(normalized_title);

                match &record.embedding {
                    Some(embedding) => {
                        match validate_embedding(&record.id, embedding, self.store.dimension()) {
                            Ok(()) => ready.push(to_paper(record, embedding.clone())),
                            Err(e) => {
                                warn!(paper_id = %record.id, error = %e, "skipping record with invalid embedding");
                                stats.record_failed();
                            }
                        }
                    }
                    None if self.embedding_provider.is_some() && has_summary(record) => {
                        pending.push(record)
                    }
                    None => {
                        debug!(paper_id = %record.id, "no embedding and nothing to embed");
                        stats.record_missing_embedding();
                    }
                }
            }

            if let (Some(provider), false) = (&self.embedding_provider, pending.is_empty()) {
                let texts: Vec<String> = pending
                    .iter()
                    .map(|r| normalize_text(r.summary.as_deref().unwrap_or_default()))
                    .collect();
                let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

                let embeddings = provider
                    .embed_batch(&text_refs)
                    .await
                    .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;
                if embeddings.len() != pending.len() {
                    // Vectors cannot be matched to records; the whole chunk fails.
                    warn!(
                        expected = pending.len(),
                        actual = embeddings.len(),
                        "provider returned the wrong number of embeddings"
                    );
                    pending.iter().for_each(|_| stats.record_failed());
                } else {
                    for (record, embedding) in pending.into_iter().zip(embeddings) {
                        match validate_embedding(&record.id, &embedding, self.store.dimension()) {
                            Ok(()) => ready.push(to_paper(record, embedding)),
                            Err(e) => {
                                warn!(paper_id = %record.id, error = %e, "provider returned an invalid embedding");
                                stats.record_failed();
                            }
                        }
                    }
                }
            }

            for paper in ready {
                match self.store.insert_paper(&paper).await {
                    Ok(_) => stats.record_inserted(),
                    Err(StorageError::DuplicateEntry(msg)) => {
                        debug!(paper_id = %paper.id, %msg, "id already stored");
                        stats.record_duplicate();
                    }
                    Err(e) => {
                        warn!(paper_id = %paper.id, title = %paper.title, error = %e, "failed to insert paper");
                        stats.record_failed();
                    }
                }
            }

            on_progress(&stats);
        }

        Ok(stats)
    }

    /// Ingest a single record and return its id.
    ///
    /// # Errors
    /// Returns `IngestionError::Duplicate` if the title is already stored,
    /// `IngestionError::InvalidInput` if there is no vector and nothing to
    /// embed, and other variants for embedding or storage failures.
    pub async fn ingest_single(&mut self, record: &PaperRecord) -> IngestionResult<i64> {
        let normalized_title = Self::normalize_title(&record.title);
        if normalized_title.is_empty() {
            return Err(IngestionError::InvalidInput("Paper title is empty".to_string()));
        }
        if self.store.exists_by_title(&normalized_title).await? {
            return Err(IngestionError::Duplicate(format!(
                "Paper with title '{}' already exists",
                record.title
            )));
        }

        let embedding = match (&record.embedding, &self.embedding_provider) {
            (Some(embedding), _) => embedding.clone(),
            (None, Some(provider)) if has_summary(record) => {
                let text = normalize_text(record.summary.as_deref().unwrap_or_default());
                provider
                    .embed(&text)
                    .await
                    .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?
            }
            (None, _) => {
                return Err(IngestionError::InvalidInput(format!(
                    "Paper {} has no embedding and no summary to embed",
                    record.id
                )))
            }
        };
        validate_embedding(&record.id, &embedding, self.store.dimension())
            .map_err(|e| IngestionError::InvalidInput(e.to_string()))?;

        Ok(self.store.insert_paper(&to_paper(record, embedding)).await?)
    }

    /// Normalized title used for deduplication.
    pub fn normalize_title(title: &str) -> String {
        normalize_text(title)
    }

    /// Fetch every record from `provider` and ingest it.
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: PaperProvider,
    {
        let records = provider.fetch_papers().await?;
        debug!(provider = provider.name(), records = records.len(), "fetched records");
        self.ingest_batch(&records).await
    }
}

fn has_summary(record: &PaperRecord) -> bool {
    record.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn to_paper(record: &PaperRecord, embedding: Vec<f32>) -> PaperEmbedding {
    PaperEmbedding::new(
        record.id.clone(),
        record.title.clone(),
        record.summary.clone(),
        embedding,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::models::PaperId;
    use crate::provider::ProviderResult;
    use crate::storage::EmbeddingStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // ===== Mock Implementations =====

    #[derive(Clone)]
    struct MockEmbeddingProvider {
        model_name: String,
        dimension: usize,
        state: Arc<Mutex<MockEmbeddingState>>,
    }

    #[derive(Default)]
    struct MockEmbeddingState {
        embed_calls: Vec<String>,
        embed_batch_calls: Vec<Vec<String>>,
        should_fail: bool,
        batch_output: Option<Vec<Vec<f32>>>,
    }

    impl MockEmbeddingProvider {
        fn new(model_name: &str, dimension: usize) -> Self {
            Self {
                model_name: model_name.to_string(),
                dimension,
                state: Arc::new(Mutex::new(MockEmbeddingState::default())),
            }
        }

        fn with_failure(self) -> Self {
            self.state.lock().unwrap().should_fail = true;
            self
        }

        fn with_batch_output(self, vectors: Vec<Vec<f32>>) -> Self {
            self.state.lock().unwrap().batch_output = Some(vectors);
            self
        }

        fn get_embed_calls(&self) -> Vec<String> {
            self.state.lock().unwrap().embed_calls.clone()
        }

        fn get_embed_batch_calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().embed_batch_calls.clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut state = self.state.lock().unwrap();
            state.embed_calls.push(text.to_string());
            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed failure".to_string()));
            }
            Ok(create_test_embedding(self.dimension))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut state = self.state.lock().unwrap();
            state
                .embed_batch_calls
                .push(texts.iter().map(|s| s.to_string()).collect());
            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed_batch failure".to_string()));
            }
            if let Some(vectors) = &state.batch_output {
                return Ok(vectors.clone());
            }
            Ok(texts.iter().map(|_| create_test_embedding(self.dimension)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

    struct MockPaperProvider {
        records: Vec<PaperRecord>,
        should_fail: bool,
    }

    #[async_trait]
    impl PaperProvider for MockPaperProvider {
        async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>> {
            if self.should_fail {
                return Err(ProviderError::ParseError("Mock provider failure".to_string()));
            }
            Ok(self.records.clone())
        }

        fn name(&self) -> &str {
            "MockProvider"
        }
    }

    // ===== Test Helper Functions =====

    const DIM: usize = 4;

    fn create_test_embedding(dimension: usize) -> Vec<f32> {
        (1..=dimension).map(|i| i as f32 / dimension as f32).collect()
    }

    fn create_test_config(model: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: model.to_string(),
            dimension,
        }
    }

    fn record(id: i64, title: &str) -> PaperRecord {
        PaperRecord {
            id: PaperId::Int(id),
            title: title.to_string(),
            summary: Some(format!("This is the summary of '{title}'")),
            embedding: None,
        }
    }

    fn record_with_vector(id: i64, title: &str, embedding: Vec<f32>) -> PaperRecord {
        PaperRecord {
            embedding: Some(embedding),
            ..record(id, title)
        }
    }

    async fn new_pipeline(
        dir: &TempDir,
        provider: Option<MockEmbeddingProvider>,
        batch_size: Option<usize>,
    ) -> IngestionPipeline<MockEmbeddingProvider> {
        let store = SqliteEmbeddingStore::new(dir.path().join("papers.db"));
        IngestionPipeline::initialize_new(store, create_test_config("test-model", DIM), provider, batch_size)
            .await
            .unwrap()
    }

    // ===== Configuration Validation Tests =====

    #[tokio::test]
    async fn test_connect_with_matching_config() {
        let dir = TempDir::new().unwrap();
        new_pipeline(&dir, None, None).await;

        let store = SqliteEmbeddingStore::new(dir.path().join("papers.db"));
        let pipeline =
            IngestionPipeline::connect(store, Some(MockEmbeddingProvider::new("test-model", DIM)), None)
                .await
                .unwrap();
        assert_eq!(pipeline.store().dimension(), Some(DIM));
    }

    #[tokio::test]
    async fn test_connect_with_model_mismatch() {
        let dir = TempDir::new().unwrap();
        new_pipeline(&dir, None, None).await;

        let store = SqliteEmbeddingStore::new(dir.path().join("papers.db"));
        let result =
            IngestionPipeline::connect(store, Some(MockEmbeddingProvider::new("model-b", DIM)), None).await;
        match result {
            Err(IngestionError::InvalidInput(msg)) => {
                assert!(msg.contains("model-b"));
                assert!(msg.contains("test-model"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[tokio::test]
    async fn test_connect_with_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        new_pipeline(&dir, None, None).await;

        let store = SqliteEmbeddingStore::new(dir.path().join("papers.db"));
        let result =
            IngestionPipeline::connect(store, Some(MockEmbeddingProvider::new("test-model", 1536)), None).await;
        match result {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("1536")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[tokio::test]
    async fn test_connect_with_missing_config() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEmbeddingStore::new(dir.path().join("fresh.db"));
        let result = IngestionPipeline::<MockEmbeddingProvider>::connect(store, None, None).await;
        match result {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("initialize_new")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[tokio::test]
    async fn test_initialize_new_rejects_mismatched_provider() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEmbeddingStore::new(dir.path().join("papers.db"));
        let result = IngestionPipeline::initialize_new(
            store,
            create_test_config("test-model", DIM),
            Some(MockEmbeddingProvider::new("test-model", 8)),
            None,
        )
        .await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
    }

    // ===== Deduplication Tests =====

    #[tokio::test]
    async fn test_deduplication_against_store_and_within_batch() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM);
        let mut pipeline = new_pipeline(&dir, Some(provider.clone()), None).await;

        pipeline.ingest_single(&record(1, "Existing Paper")).await.unwrap();

        let stats = pipeline
            .ingest_batch(&[
                record(2, "  EXISTING   paper "),
                record(3, "New Paper"),
                record(4, "new paper"),
            ])
            .await
            .unwrap();

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.duplicates_skipped, 2);
        assert_eq!(stats.inserted, 1);

        // Only the new paper is embedded.
        let batch_calls = provider.get_embed_batch_calls();
        assert_eq!(batch_calls.len(), 1);
        assert_eq!(batch_calls[0].len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_counts_as_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, None, None).await;

        let stats = pipeline
            .ingest_batch(&[
                record_with_vector(1, "First", create_test_embedding(DIM)),
                record_with_vector(1, "Second", create_test_embedding(DIM)),
            ])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates_skipped, 1);
    }

    // ===== Batch Processing Tests =====

    #[tokio::test]
    async fn test_batch_processing_respects_batch_size() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM);
        let mut pipeline = new_pipeline(&dir, Some(provider.clone()), Some(2)).await;

        let records: Vec<PaperRecord> = (1..=5).map(|i| record(i, &format!("Paper {i}"))).collect();
        let mut progress = Vec::new();
        let stats = pipeline
            .ingest_batch_with_progress(&records, |s| progress.push(s.total_processed))
            .await
            .unwrap();

        assert_eq!(stats.inserted, 5);
        assert_eq!(progress, vec![2, 4, 5]);

        let batch_calls = provider.get_embed_batch_calls();
        let sizes: Vec<usize> = batch_calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(pipeline.store().count_papers().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_short_provider_batch_fails_the_chunk() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM)
            .with_batch_output(vec![create_test_embedding(DIM)]);
        let mut pipeline = new_pipeline(&dir, Some(provider), None).await;

        let records: Vec<PaperRecord> = (1..=3).map(|i| record(i, &format!("Paper {i}"))).collect();
        let stats = pipeline.ingest_batch(&records).await.unwrap();

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.inserted, 0);
        assert_eq!(pipeline.store().count_papers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_provider_vectors_are_counted_as_failed() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM).with_batch_output(vec![
            create_test_embedding(DIM),
            create_test_embedding(DIM + 1),
            vec![f32::NAN; DIM],
        ]);
        let mut pipeline = new_pipeline(&dir, Some(provider), None).await;

        let records: Vec<PaperRecord> = (1..=3).map(|i| record(i, &format!("Paper {i}"))).collect();
        let stats = pipeline.ingest_batch(&records).await.unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.failed, 2);
        assert!(pipeline.store().get_paper(&PaperId::Int(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_precomputed_vectors_skip_the_provider() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM);
        let mut pipeline = new_pipeline(&dir, Some(provider.clone()), None).await;

        let stats = pipeline
            .ingest_batch(&[record_with_vector(7, "Has Vector", vec![0.5, 0.5, 0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert!(provider.get_embed_batch_calls().is_empty());

        let stored = pipeline.store().get_paper(&PaperId::Int(7)).await.unwrap();
        assert_eq!(stored.embedding, vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_records_without_vector_or_provider() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, None, None).await;

        let mut no_summary = record(2, "No Summary");
        no_summary.summary = None;
        let stats = pipeline
            .ingest_batch(&[record(1, "Needs Embedding"), no_summary])
            .await
            .unwrap();
        assert_eq!(stats.missing_embedding, 2);
        assert_eq!(stats.inserted, 0);
    }

    #[tokio::test]
    async fn test_invalid_vectors_are_counted_as_failed() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, None, None).await;

        let stats = pipeline
            .ingest_batch(&[
                record_with_vector(1, "Wrong Dimension", vec![1.0, 0.0]),
                record_with_vector(2, "Not Finite", vec![f32::NAN, 0.0, 0.0, 0.0]),
                record_with_vector(3, "   ", create_test_embedding(DIM)),
                record_with_vector(4, "Good", create_test_embedding(DIM)),
            ])
            .await
            .unwrap();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.inserted, 1);
    }

    #[tokio::test]
    async fn test_text_ids_fail_to_insert() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, None, None).await;

        let mut text_id = record_with_vector(0, "Text Id", create_test_embedding(DIM));
        text_id.id = PaperId::from("2401.00001");
        let stats = pipeline.ingest_batch(&[text_id]).await.unwrap();
        assert_eq!(stats.failed, 1);
    }

    // ===== Single Paper Ingestion Tests =====

    #[tokio::test]
    async fn test_ingest_single_success() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM);
        let mut pipeline = new_pipeline(&dir, Some(provider.clone()), None).await;

        let id = pipeline.ingest_single(&record(42, "Single Paper")).await.unwrap();
        assert_eq!(id, 42);
        assert_eq!(
            provider.get_embed_calls(),
            vec!["this is the summary of 'single paper'".to_string()]
        );
    }

    #[tokio::test]
    async fn test_ingest_single_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, Some(MockEmbeddingProvider::new("test-model", DIM)), None).await;

        pipeline.ingest_single(&record(1, "Existing Paper")).await.unwrap();
        match pipeline.ingest_single(&record(2, "Existing Paper")).await {
            Err(IngestionError::Duplicate(msg)) => assert!(msg.contains("Existing Paper")),
            _ => panic!("Expected Duplicate error"),
        }
    }

    #[tokio::test]
    async fn test_ingest_single_without_source() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, None, None).await;
        let result = pipeline.ingest_single(&record(1, "Nothing To Embed")).await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
    }

    // ===== Provider Integration Tests =====

    #[tokio::test]
    async fn test_ingest_from_provider() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = new_pipeline(&dir, Some(MockEmbeddingProvider::new("test-model", DIM)), None).await;

        let corpus = MockPaperProvider {
            records: vec![record(1, "Paper 1"), record(2, "Paper 2")],
            should_fail: false,
        };
        let stats = pipeline.ingest_from_provider(&corpus).await.unwrap();
        assert_eq!(stats.inserted, 2);

        let failing = MockPaperProvider {
            records: Vec::new(),
            should_fail: true,
        };
        assert!(matches!(
            pipeline.ingest_from_provider(&failing).await,
            Err(IngestionError::ProviderError(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_error_aborts_batch() {
        let dir = TempDir::new().unwrap();
        let provider = MockEmbeddingProvider::new("test-model", DIM).with_failure();
        let mut pipeline = new_pipeline(&dir, Some(provider), None).await;

        let result = pipeline.ingest_batch(&[record(1, "Paper")]).await;
        assert!(matches!(result, Err(IngestionError::EmbeddingError(_))));
    }

    // ===== Statistics Tests =====

    #[test]
    fn test_stats_record_methods() {
        let mut stats = IngestionStats::new();
        stats.record_inserted();
        stats.record_duplicate();
        stats.record_missing_embedding();
        stats.record_failed();

        assert_eq!(stats.total_processed, 4);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(stats.missing_embedding, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_normalize_title() {
        let normalized = IngestionPipeline::<MockEmbeddingProvider>::normalize_title("  UPPERCASE   Title ");
        assert_eq!(normalized, "uppercase title");
    }
}
