use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Invalid chunk parameters: overlap {overlap} must be smaller than window {window}")]
    InvalidChunkParameters { window: usize, overlap: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("A reindex job is already running for '{directory}' (job {job_id})")]
    JobAlreadyRunning { directory: String, job_id: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to extract {path}: {reason}")]
    ExtractionFailure { path: String, reason: String },

    #[error("Embedding gateway failed: {0}")]
    EmbeddingGatewayFailure(String),

    #[error("Index store failed: {0}")]
    IndexStore(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
