use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The extractor executable could not be started at all.
    #[error("Failed to invoke the occurrence extractor `{0}`; make sure it is installed and on the search path")]
    ExtractorUnavailable(String),

    /// The extractor ran but exited with a failure for one batch.
    #[error("Extractor failed: {0}")]
    ExtractorFailed(String),

    /// Stored index was written by a newer (or incompatible) format.
    #[error("Index format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Index is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to invoke the search tool `{0}`; make sure it is installed and on the search path")]
    SearchToolUnavailable(String),

    #[error("No project directory to index; add at least one folder to the project")]
    NoProject,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

impl IndexerError {
    /// Failures that mean the on-disk index must be thrown away and rebuilt.
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, IndexerError::FormatMismatch(_) | IndexerError::Corrupt(_))
    }

    /// Failures caused by a missing external tool rather than by the data.
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            IndexerError::ExtractorUnavailable(_) | IndexerError::SearchToolUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
