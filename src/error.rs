//! Error taxonomy shared by every stage of the pipeline.

use thiserror::Error;

/// Errors raised while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// The file extension is not one of the supported document formats.
    #[error("Unsupported document format: {0}. Only pdf, docx and txt files are supported.")]
    UnsupportedFormat(String),

    /// The document exists but its text could not be read.
    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: String, reason: String },

    /// The embedding provider failed or returned something unusable.
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    /// The vector index rejected an insert or a query.
    #[error("Vector index error: {0}")]
    Index(String),

    /// The language model call failed.
    #[error("Generation request failed: {0}")]
    Generation(String),

    /// An upload exceeds the configured size limit.
    #[error("File is too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Missing or malformed configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn extraction(path: &std::path::Path, reason: impl ToString) -> Self {
        RagError::Extraction {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, RagError>;
