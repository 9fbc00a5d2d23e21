//! Error types for step execution and collaborator calls.

use ews_domain::DomainError;
use thiserror::Error;

/// Failure talking to the bug tracker.
///
/// `NotFound` is a definite answer; `Transport` and `Malformed` mean the
/// answer is unknown and callers must not treat them as disqualifying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("failed to access {url}: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Errors that abort a step. The engine records them as an EXCEPTION result.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("command has no executable")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bug tracker error: {0}")]
    Fetch(#[from] FetchError),

    #[error("result store error: {0}")]
    Store(String),

    #[error("artifact transfer error: {0}")]
    Transfer(String),

    #[error("reporter error: {0}")]
    Reporter(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for step operations
pub type Result<T> = std::result::Result<T, StepError>;
