//! Unified error types for the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// I/O or filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// File extension is not handled by the loader.
    #[error("unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A supported file could not be read or decoded.
    #[error("failed to extract {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    /// Collection directory exists but cannot be opened.
    #[error("failed to load collection `{name}`: {reason}")]
    CollectionLoad { name: String, reason: String },

    /// One ingestion batch failed; the run continues with the next one.
    #[error("batch {batch} of collection `{name}` failed: {reason}")]
    BatchIngestion {
        name: String,
        batch: usize,
        reason: String,
    },

    /// Mismatch in vector dimensionality across records.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Collection was built with another embedding model.
    #[error("embedding model mismatch: collection uses `{stored}`, embedder is `{current}`")]
    EmbeddingMismatch { stored: String, current: String },

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Background task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::Parse(e.to_string())
    }
}

impl From<ai_llm_service::AiLlmError> for RagError {
    fn from(e: ai_llm_service::AiLlmError) -> Self {
        RagError::Embedding(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RagError {
    fn from(e: tokio::task::JoinError) -> Self {
        RagError::Task(e.to_string())
    }
}
