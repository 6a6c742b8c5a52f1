use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook read failed: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No header row found in the first {scanned} rows of {file}")]
    HeaderNotFound { file: String, scanned: usize },

    #[error("Source {0} contains no sheets or rows")]
    EmptySource(String),

    #[error("Unsupported source format for {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt import checkpoint for {file}: {reason}")]
    CorruptCheckpoint { file: String, reason: String },

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Structural errors fail a whole source file but never the run.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            IngestError::HeaderNotFound { .. }
                | IngestError::EmptySource(_)
                | IngestError::UnsupportedFormat(_)
                | IngestError::Workbook(_)
                | IngestError::Csv(_)
                | IngestError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
