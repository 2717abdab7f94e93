//! Error types for the `docqa-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in ingestion, indexing and query operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document's format has no registered loader.
    #[error("Unsupported format for '{source_name}': '{extension}' (expected pdf, txt or md)")]
    UnsupportedFormat {
        /// The file name or source identifier of the rejected document.
        source_name: String,
        /// The extension that was not recognized (may be empty).
        extension: String,
    },

    /// A document could not be read or decoded into text.
    #[error("Failed to load document '{source_name}': {message}")]
    DocumentLoad {
        /// The file name or source identifier of the document.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding's length disagrees with the vectors already in the index.
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the vectors already stored.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },

    /// The index was built with a different embedding model than the one configured.
    #[error("Embedding model mismatch: index was built with '{expected}', configured '{actual}'")]
    ModelMismatch {
        /// The model recorded in the index manifest.
        expected: String,
        /// The model of the configured embedding provider.
        actual: String,
    },

    /// The on-disk index could not be parsed.
    #[error(
        "Index corrupt at {}{}: {message}",
        .path.display(),
        .line.map(|l| format!(" line {l}")).unwrap_or_default()
    )]
    IndexCorrupt {
        /// The file that failed to parse.
        path: PathBuf,
        /// The 1-based line number of the bad record, if the failure is line-scoped.
        line: Option<usize>,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend failed or timed out.
    #[error("Generation backend error ({backend}): {message}")]
    GenerationBackendError {
        /// The generation backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A request parameter is out of its accepted range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A filesystem error in the vector store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether the error leaves the affected index instance unusable until it
    /// is repaired or rebuilt.
    pub fn is_index_integrity(&self) -> bool {
        matches!(
            self,
            RagError::DimensionMismatch { .. }
                | RagError::ModelMismatch { .. }
                | RagError::IndexCorrupt { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
