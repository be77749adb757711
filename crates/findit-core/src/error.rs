//! Error taxonomy shared by every layer of the indexer and search engine.
//!
//! Mirrors the six error kinds the rest of the system is built around:
//! bad input, missing records, retryable transient failures, per-file
//! failures that don't stop the indexer, process-stopping failures, and
//! programmer errors (mutating a read-only vector index view).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FindItError {
    #[error("invalid parameter: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("indexing failed for file: {0}")]
    FatalPerFile(String),

    #[error("fatal error: {0}")]
    FatalGlobal(#[source] anyhow::Error),

    #[error("vector index is read-only")]
    ReadOnly,
}

impl FindItError {
    /// Whether this error should be retried with backoff rather than
    /// recorded as a terminal failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, FindItError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, FindItError>;
