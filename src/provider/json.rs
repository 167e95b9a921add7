//! JSON file provider.
//!
//! Reads a corpus file that is either a bare array of records or an object
//! with a `papers` array:
//!
//! ```json
//! [
//!   {"id": 1, "title": "...", "summary": "...", "embedding": [0.1, 0.2]},
//!   {"id": 2, "title": "...", "summary": "..."}
//! ]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{PaperProvider, PaperRecord, ProviderError, ProviderResult};

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    List(Vec<PaperRecord>),
    Wrapped { papers: Vec<PaperRecord> },
}

/// Provider backed by a JSON file, loaded eagerly.
#[derive(Debug, Clone)]
pub struct JsonFilePaperProvider {
    name: String,
    records: Vec<PaperRecord>,
}

impl JsonFilePaperProvider {
    /// Load and parse `path`.
    ///
    /// # Errors
    /// Returns `ProviderError::IoError` if the file cannot be read and
    /// `ProviderError::ParseError` if it is not a valid corpus file.
    pub async fn from_file(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;
        let provider = Self::parse(&content, display_name(&path))?;
        debug!(path = %path.display(), records = provider.records.len(), "loaded corpus file");
        Ok(provider)
    }

    /// Parse an in-memory corpus document.
    pub fn from_json_str(content: &str) -> ProviderResult<Self> {
        Self::parse(content, "inline JSON".to_string())
    }

    fn parse(content: &str, name: String) -> ProviderResult<Self> {
        let file: CorpusFile =
            serde_json::from_str(content).map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let records = match file {
            CorpusFile::List(records) => records,
            CorpusFile::Wrapped { papers } => papers,
        };
        Ok(Self { name, records })
    }

    pub fn records(&self) -> &[PaperRecord] {
        &self.records
    }
}

fn display_name(path: &Path) -> String {
    format!("JSON file {}", path.display())
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>> {
        Ok(self.records.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.records.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
