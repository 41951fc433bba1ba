use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("No tables found in database: {database}")]
    NoTables { database: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding service did not respond within {after:?}")]
    EmbeddingTimeout { after: Duration },

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("No schema index at {}: {reason}. Run `schema-rag build` first", path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Embedding model mismatch: index was built with '{indexed}' but '{configured}' is configured. Rebuild the index"
    )]
    ModelMismatch { indexed: String, configured: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers to decide how to react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing has been built yet, or the artifacts are unusable
    NoIndex,
    /// The request itself was rejected
    BadQuery,
    /// The embedding service was unavailable; the only kind worth retrying
    Transient,
    /// Build-time and query-time embedding configuration disagree
    Mismatch,
    /// The source database has nothing to index
    Build,
    Internal,
}

impl RagError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IndexNotFound { .. } => ErrorKind::NoIndex,
            Self::InvalidQuery(_) => ErrorKind::BadQuery,
            Self::EmbeddingTimeout { .. } | Self::EmbeddingUnavailable(_) => {
                ErrorKind::Transient
            }
            Self::DimensionMismatch { .. } | Self::ModelMismatch { .. } => ErrorKind::Mismatch,
            Self::NoTables { .. } => ErrorKind::Build,
            Self::Embedding(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub mod builder;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod relations;
pub mod retriever;
pub mod service;

pub use builder::{BuildReport, SchemaIndexBuilder};
pub use catalog::{SchemaSource, SqliteCatalog, TableSchema};
pub use embeddings::{Embedder, EmbeddingError, OllamaClient};
pub use index::IndexSettings;
pub use retriever::{RetrievedTable, SchemaRetriever, ScoredTable};
pub use service::SchemaService;
