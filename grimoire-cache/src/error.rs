//! Error types for grimoire-cache

use thiserror::Error;

/// Errors that can occur in the entity cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// An atomic batch write failed and nothing from the batch was committed
    #[error("Batch write to '{record_type}' failed at slug '{first_slug}': {reason}")]
    BatchWrite {
        record_type: String,
        first_slug: String,
        reason: String,
    },

    /// Record or vector could not be encoded for storage
    #[error("Encode error: {0}")]
    Encode(String),

    /// Stored bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing required key or filter name outside the allowlist
    #[error("Validation error: {0}")]
    Validation(String),

    /// Model loading error
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// On-disk layout written by an incompatible version
    #[error("Unsupported schema version {found} (supported: {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CacheError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl std::fmt::Display) -> Self {
        Self::Encode(msg.to_string())
    }

    /// Create a decode error
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error came from the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::BatchWrite { .. } | Self::Encode(_) | Self::Decode(_)
        )
    }

    /// Whether the error came from the embedding model
    pub fn is_embedding(&self) -> bool {
        matches!(self, Self::Model(_) | Self::Embedding(_))
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
