// Embeddings module
// Embedding providers and the deadline wrapper used by the builder and retriever

#[cfg(test)]
mod tests;

pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::RagError;

pub use ollama::{ModelInfo, OllamaClient};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("embedding service rejected the request: {0}")]
    Rejected(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Computes fixed-size vectors for text
///
/// Implementations must return exactly one vector per input, in input order,
/// all of the same length.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors, recorded in the index
    fn model_id(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Check the shape of a provider response against its request
///
/// Returns the common dimension of all vectors.
#[inline]
pub fn validate_embeddings(
    requested: usize,
    embeddings: &[Vec<f32>],
) -> Result<usize, EmbeddingError> {
    if embeddings.len() != requested {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            requested,
            embeddings.len()
        )));
    }

    let Some(first) = embeddings.first() else {
        return Ok(0);
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(EmbeddingError::InvalidResponse(
            "embedding vectors are empty".to_string(),
        ));
    }

    if let Some(position) = embeddings.iter().position(|e| e.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(format!(
            "embedding {} has {} dimensions, expected {}",
            position,
            embeddings[position].len(),
            dimension
        )));
    }

    Ok(dimension)
}

/// Run a blocking embedding call under a deadline
///
/// Timeouts and transport failures map to the retryable
/// [`RagError::EmbeddingTimeout`] and [`RagError::EmbeddingUnavailable`];
/// everything else is [`RagError::Embedding`].
pub async fn embed_with_deadline(
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
    deadline: Duration,
) -> crate::Result<Vec<Vec<f32>>> {
    let requested = texts.len();
    debug!("Embedding {} texts with deadline {:?}", requested, deadline);

    let task = tokio::task::spawn_blocking(move || embedder.embed(&texts));

    let joined = tokio::time::timeout(deadline, task).await.map_err(|_| {
        warn!("Embedding call exceeded deadline of {:?}", deadline);
        RagError::EmbeddingTimeout { after: deadline }
    })?;

    let embeddings = match joined {
        Ok(Ok(embeddings)) => embeddings,
        Ok(Err(EmbeddingError::Timeout)) => {
            return Err(RagError::EmbeddingTimeout { after: deadline });
        }
        Ok(Err(EmbeddingError::Transport(message))) => {
            return Err(RagError::EmbeddingUnavailable(message));
        }
        Ok(Err(e)) => return Err(RagError::Embedding(e.to_string())),
        Err(e) => {
            return Err(RagError::Embedding(format!(
                "embedding task failed: {}",
                e
            )));
        }
    };

    validate_embeddings(requested, &embeddings)
        .map_err(|e| RagError::Embedding(e.to_string()))?;

    Ok(embeddings)
}
