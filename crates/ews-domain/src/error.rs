//! Error types for EWS domain operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid build configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown configuration '{0}', expected debug or release")]
    UnknownConfiguration(String),

    #[error("build properties were already configured for this build")]
    AlreadyConfigured,

    #[error("invalid test results: {0}")]
    InvalidTestResults(#[from] serde_json::Error),

    #[error("test results carry none of the Timedout, Crashed or Failed categories")]
    MissingTestCategories,
}

/// Result type for EWS domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
