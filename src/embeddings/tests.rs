use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

struct FixedEmbedder {
    result: fn(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>,
    calls: AtomicUsize,
}

impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        "fixed"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.result)(texts)
    }
}

struct SlowEmbedder;

impl Embedder for SlowEmbedder {
    fn model_id(&self) -> &str {
        "slow"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }
}

fn embedder(result: fn(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>) -> Arc<FixedEmbedder> {
    Arc::new(FixedEmbedder {
        result,
        calls: AtomicUsize::new(0),
    })
}

#[test]
fn validate_accepts_uniform_vectors() {
    let embeddings = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
    assert_eq!(validate_embeddings(2, &embeddings).expect("valid"), 2);
}

#[test]
fn validate_rejects_count_mismatch() {
    let embeddings = vec![vec![0.1, 0.2]];
    assert!(matches!(
        validate_embeddings(2, &embeddings),
        Err(EmbeddingError::InvalidResponse(_))
    ));
}

#[test]
fn validate_rejects_ragged_vectors() {
    let embeddings = vec![vec![0.1, 0.2], vec![0.3]];
    assert!(validate_embeddings(2, &embeddings).is_err());
}

#[test]
fn validate_rejects_empty_vectors() {
    let embeddings = vec![Vec::new()];
    assert!(validate_embeddings(1, &embeddings).is_err());
}

#[tokio::test]
async fn deadline_passes_through_results() {
    let stub = embedder(|texts| Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect()));

    let result = embed_with_deadline(
        stub.clone(),
        vec!["a".to_string()],
        Duration::from_secs(5),
    )
    .await
    .expect("embedding should succeed");

    assert_eq!(result, vec![vec![1.0, 2.0]]);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deadline_elapsed_is_retryable() {
    let err = embed_with_deadline(
        Arc::new(SlowEmbedder),
        vec!["a".to_string()],
        Duration::from_millis(20),
    )
    .await
    .expect_err("slow embedder should time out");

    assert!(matches!(err, RagError::EmbeddingTimeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn transport_errors_are_retryable() {
    let stub = embedder(|_| Err(EmbeddingError::Transport("connection refused".into())));

    let err = embed_with_deadline(stub, vec!["a".to_string()], Duration::from_secs(5))
        .await
        .expect_err("transport error should propagate");

    assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rejected_requests_are_not_retryable() {
    let stub = embedder(|_| Err(EmbeddingError::Rejected("model not found".into())));

    let err = embed_with_deadline(stub, vec!["a".to_string()], Duration::from_secs(5))
        .await
        .expect_err("rejection should propagate");

    assert!(matches!(err, RagError::Embedding(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn malformed_provider_output_is_caught() {
    let stub = embedder(|_| Ok(vec![vec![1.0]]));

    let err = embed_with_deadline(
        stub,
        vec!["a".to_string(), "b".to_string()],
        Duration::from_secs(5),
    )
    .await
    .expect_err("count mismatch should fail");

    assert!(matches!(err, RagError::Embedding(_)));
}
