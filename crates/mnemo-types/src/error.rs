use thiserror::Error;

/// Errors from repository and index operations (used by trait definitions in mnemo-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),

    #[error("turn content must not be empty")]
    EmptyContent,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("maintenance error: {0}")]
    Maintenance(String),
}
