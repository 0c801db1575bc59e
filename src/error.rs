//! Error types for statistics cache operations.
//!
//! Each collaborator boundary has its own error type:
//! - Cache registry reads and writes
//! - Remote compute calls (job submission, status, artifacts)
//! - Statistics store writes
//!
//! `CacheError` is what pipeline stages return. It wraps the collaborator
//! errors and classifies them so the caller can tell a transient failure
//! (retried on the next scheduled cycle) from a data integrity failure
//! (needs investigation).

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during cache registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Record {0} not found in registry")]
    NotFound(Uuid),

    #[error("Duplicate natural key: {0}")]
    DuplicateKey(String),

    #[error("Expected exactly one {what}, found {found}")]
    UnexpectedCount { what: String, found: usize },

    #[error("Record {id} is a {actual} record, expected {expected}")]
    KindMismatch {
        id: Uuid,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Returns true for errors that indicate inconsistent registry content
    /// rather than a failed call.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            RegistryError::DuplicateKey(_)
                | RegistryError::UnexpectedCount { .. }
                | RegistryError::KindMismatch { .. }
                | RegistryError::InvalidRecord(_)
        )
    }
}

/// Errors that can occur when talking to the remote compute platform.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Missing compute base URL: STATS_CACHE_COMPUTE_URL environment variable not set")]
    MissingBaseUrl,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Compute API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse compute response: {0}")]
    ParseError(String),

    #[error("Job {0} not found")]
    JobNotFound(String),
}

/// Errors that can occur while persisting or deleting parsed statistics.
#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("Statistics store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// How a stage failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A collaborator call failed; the next scheduled cycle retries.
    Transient,
    /// Registry content is inconsistent; not retried automatically.
    Integrity,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Integrity => write!(f, "integrity"),
        }
    }
}

/// Error returned by pipeline stages.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Statistics store error: {0}")]
    Statistics(#[from] StatisticsError),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("{0} runs stages and needs the stage queue; set REDIS_URL or use the service's /admin endpoints")]
    QueueRequired(&'static str),
}

impl CacheError {
    /// Classifies the error per the operational taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Registry(e) if e.is_integrity() => ErrorKind::Integrity,
            CacheError::Integrity(_) => ErrorKind::Integrity,
            _ => ErrorKind::Transient,
        }
    }
}
