//! # Document Source Errors

use thiserror::Error;

/// Result type for document source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors reported by the document store collaborator
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document store closed")]
    Closed,

    #[error("Corrupt document {doc_id}: {reason}")]
    Corrupt { doc_id: String, reason: String },

    #[error("I/O error: {0}")]
    IoError(String),
}

impl SourceError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::IoError(_))
    }
}
