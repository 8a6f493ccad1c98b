//! Error types for the Grimoire service layer.

use grimoire_cache::CacheError;
use thiserror::Error;

/// Errors surfaced by [`crate::ContentService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Content cache not initialized")]
    NotInitialized,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Task(err.to_string())
    }
}

impl ServiceError {
    /// Stable code for a tool-dispatch caller
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotInitialized => "unavailable",
            ServiceError::Task(_) => "internal",
            ServiceError::Cache(err) => match err {
                CacheError::Validation(_) | CacheError::Json(_) => "invalid_params",
                CacheError::Model(_) | CacheError::Embedding(_) | CacheError::SchemaVersion { .. } => {
                    "unavailable"
                }
                _ => "internal",
            },
        }
    }
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
