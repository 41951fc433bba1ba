#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama HTTP contract, exercised against a mock server

use std::sync::Arc;
use std::time::Duration;

use schema_rag::catalog::{StaticSchemaSource, TableSchema};
use schema_rag::config::OllamaConfig;
use schema_rag::embeddings::{Embedder, EmbeddingError, OllamaClient, embed_with_deadline};
use schema_rag::{IndexSettings, RagError, SchemaService};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const MODEL: &str = "nomic-embed-text:latest";

/// Answers `/api/embed` with one keyword-indicator vector per input
struct KeywordResponder;

impl Respond for KeywordResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400).set_body_json(json!({"error": "bad json"})),
        };
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| {
                        let text = input.as_str().unwrap_or_default();
                        ["customer", "payment", "film"]
                            .iter()
                            .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "model": MODEL,
            "embeddings": embeddings,
        }))
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("schema_rag=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn config_for(server: &MockServer) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: MODEL.to_string(),
        batch_size: 2,
        timeout_seconds: 5,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&config_for(server)).expect("Failed to create client")
}

async fn embed_blocking(
    client: OllamaClient,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("embedding task should not panic")
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_in_batches_preserving_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": MODEL})))
        .respond_with(KeywordResponder)
        .expect(2)
        .mount(&server)
        .await;

    let texts = vec![
        "Table: film".to_string(),
        "Table: customer".to_string(),
        "Table: payment".to_string(),
    ];
    let embeddings = embed_blocking(client_for(&server), texts)
        .await
        .expect("embedding should succeed");

    assert_eq!(
        embeddings,
        vec![
            vec![0.0, 0.0, 1.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn single_text_is_sent_as_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["customer information"]})))
        .respond_with(KeywordResponder)
        .expect(1)
        .mount(&server)
        .await;

    let embeddings = embed_blocking(
        client_for(&server),
        vec!["customer information".to_string()],
    )
    .await
    .expect("embedding should succeed");

    assert_eq!(embeddings, vec![vec![1.0, 0.0, 0.0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_attempts(3);
    let result = embed_blocking(client, vec!["x".to_string()]).await;

    match result {
        Err(EmbeddingError::Rejected(message)) => assert_eq!(message, "model not found"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let client: Arc<dyn Embedder> = Arc::new(client_for(&server));
    let err = embed_with_deadline(client, vec!["x".to_string()], Duration::from_secs(5))
        .await
        .expect_err("should fail");

    assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_embedding_count_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": []})))
        .mount(&server)
        .await;

    let result = embed_blocking(client_for(&server), vec!["x".to_string()]).await;

    assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_server_hits_the_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client: Arc<dyn Embedder> = Arc::new(client_for(&server));
    let err = embed_with_deadline(client, vec!["x".to_string()], Duration::from_millis(200))
        .await
        .expect_err("should time out");

    assert!(matches!(err, RagError::EmbeddingTimeout { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_finds_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3:8b", "size": 4_661_224_676u64},
                {"name": MODEL, "size": 274_302_450u64, "digest": "0a109f422b47"},
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (health, models) = tokio::task::spawn_blocking(move || {
        (client.health_check(), client.list_models())
    })
    .await
    .expect("task should not panic");

    assert!(health.is_ok(), "health check failed: {:?}", health);
    let models = models.expect("models listed");
    assert_eq!(models.len(), 2);
    assert_eq!(models[1].digest.as_deref(), Some("0a109f422b47"));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama3:8b"}]})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should not panic");

    assert!(health.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn build_and_retrieve_through_ollama() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordResponder)
        .mount(&server)
        .await;

    let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
    let settings = IndexSettings::new(temp_dir.path().join("vectors"), MODEL)
        .with_expected_dimension(3)
        .with_embed_timeout(Duration::from_secs(5));
    let source = Arc::new(StaticSchemaSource::new(vec![
        TableSchema::new("film", vec!["film_id".to_string(), "title".to_string()]),
        TableSchema::new(
            "customer",
            vec!["customer_id".to_string(), "email".to_string()],
        ),
        TableSchema::new("payment", vec!["payment_id".to_string()]),
    ]));
    let service = SchemaService::new(settings, source, Arc::new(client_for(&server)));

    let report = service.rebuild().await.expect("build should succeed");
    assert_eq!(report.table_count, 3);
    assert_eq!(report.dimension, 3);

    let results = service
        .retrieve("customer information", Some(1))
        .await
        .expect("should retrieve");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].table_name, "customer");
    assert_eq!(
        results[0].schema_text,
        "Table: customer | Columns: customer_id, email"
    );
}
