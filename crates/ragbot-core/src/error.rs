//! Tagged error type for the retrieval core.
//!
//! Every failure that crosses the core boundary carries an [`ErrorKind`]
//! so the transport layer can pick a status code without inspecting
//! message text.

use thiserror::Error;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors surfaced by the retrieval core.
#[derive(Debug, Error)]
pub enum RagError {
    /// Rejected input: non-PDF or empty upload, empty question.
    #[error("{0}")]
    Validation(String),

    /// The extractor could not read one file of an upload batch.
    #[error("error reading {filename}: {message}")]
    Extraction { filename: String, message: String },

    /// Embedding or assembling an index failed. The previous index stays live.
    #[error("error building vector index: {0}")]
    IndexBuild(String),

    /// A query arrived while no index exists.
    #[error("No documents uploaded yet. Please upload PDF documents first.")]
    NotReady,

    /// Unknown document id.
    #[error("document {0} not found")]
    NotFound(u64),

    /// Embedding the query text failed.
    #[error("error embedding query: {0}")]
    Embedding(String),

    /// The answer generator failed.
    #[error("error generating answer: {0}")]
    Generation(String),
}

/// Coarse classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Extraction,
    IndexBuild,
    NotReady,
    NotFound,
    Embedding,
    Generation,
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    pub fn extraction(filename: impl Into<String>, message: impl std::fmt::Display) -> Self {
        RagError::Extraction {
            filename: filename.into(),
            message: message.to_string(),
        }
    }

    pub fn index_build(message: impl std::fmt::Display) -> Self {
        RagError::IndexBuild(message.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Validation(_) => ErrorKind::Validation,
            RagError::Extraction { .. } => ErrorKind::Extraction,
            RagError::IndexBuild(_) => ErrorKind::IndexBuild,
            RagError::NotReady => ErrorKind::NotReady,
            RagError::NotFound(_) => ErrorKind::NotFound,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Generation(_) => ErrorKind::Generation,
        }
    }

    /// True for failures the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Extraction | ErrorKind::NotReady | ErrorKind::NotFound
        )
    }
}
