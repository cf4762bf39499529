use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Suggestion error: {0}")]
    Suggestion(#[from] SuggestionError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Storage quota exceeded: {requested} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { requested: usize, limit: usize },

    #[error("Stored record is corrupt: {0}")]
    Corruption(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("Request was superseded")]
    Cancelled,

    #[error("Source {name} failed: {message}")]
    Source { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, AppError>;
