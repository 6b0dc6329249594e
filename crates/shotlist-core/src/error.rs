//! Error types for shotlist.

use thiserror::Error;

/// Result type alias using shotlist's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for shotlist operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed query or input. Rejected immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Asset not found
    #[error("Asset not found: {0}")]
    AssetNotFound(uuid::Uuid),

    /// Cached candidate set not found for a query key
    #[error("No cached candidates for query key: {0}")]
    QueryKeyNotFound(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// A pipeline stage failed (transient, retried with backoff)
    #[error("Pipeline stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// External embedding/transcription backend unavailable
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Trust-update contention after retry
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for the API error envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::AssetNotFound(_) | Error::QueryKeyNotFound(_) => "not_found",
            Error::Embedding(_) => "embedding_error",
            Error::Transcription(_) => "transcription_error",
            Error::Stage { .. } => "pipeline_stage_error",
            Error::ExternalService(_) => "external_service_error",
            Error::Consistency(_) => "consistency_error",
            Error::Serialization(_) => "serialization_error",
            Error::Config(_) => "config_error",
            Error::Request(_) => "request_error",
            Error::Internal(_) => "internal_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Whether the caller may retry the operation.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::Stage { .. }
                | Error::ExternalService(_)
                | Error::Consistency(_)
                | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
