use crate::models::DistanceMetric;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load pdf {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid file name {0:?}: expected a single path component")]
    InvalidFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no persisted index at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("vector dimension {actual} does not match expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index was built with model {persisted}, store is configured with {configured}")]
    ModelMismatch {
        persisted: String,
        configured: String,
    },

    #[error("index was built with {persisted:?} distance, store is configured with {configured:?}")]
    MetricMismatch {
        persisted: DistanceMetric,
        configured: DistanceMetric,
    },

    #[error("no chunks to index")]
    EmptyInput,

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("unsupported index format version {0}")]
    UnsupportedFormat(u32),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
