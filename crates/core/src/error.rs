use thiserror::Error;

/// Failures of a single embedding strategy. These never cross the
/// embedding provider boundary; the cascade logs them and moves on.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("no embedding payload recognized: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Failures of the chat completion backend. Absorbed by the answer
/// synthesizer, which degrades to heuristic extraction.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding dimension {actual} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Database(error.to_string())
    }
}

/// Structural retrieval failures. Transient backend trouble never shows
/// up here; the tiers absorb it.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document not vectorized yet: {0}")]
    NotVectorized(String),

    #[error("no chunks matched for document {0}")]
    NoChunksFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document has no text to chunk: {0}")]
    EmptyDocument(String),

    #[error("ingestion halted after {completed} chunk(s): {reason}")]
    PartialWrite { completed: usize, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = RetrieveError> = std::result::Result<T, E>;
