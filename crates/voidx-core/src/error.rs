use thiserror::Error;

use crate::types::DocId;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource is mid-transition (e.g. a collection that is loading).
    /// Retry with backoff.
    #[error("Transient: {0}, retry later")]
    Transient(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArg(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn backend<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend { context: context.into(), source: source.into() }
    }

    /// Create/Drop are idempotent, so callers may retry these two classes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Backend { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An ingest call stopped early. `written_ids` lists the rows of every batch
/// committed before the failure, in input order.
#[derive(Debug, Error)]
#[error("indexing aborted after {} rows: {source}", .written_ids.len())]
pub struct IndexAborted {
    pub written_ids: Vec<DocId>,
    #[source]
    pub source: Error,
}

impl From<IndexAborted> for Error {
    fn from(e: IndexAborted) -> Self {
        e.source
    }
}
