use super::*;
use crate::EmbeddingError;
use crate::builder::SchemaIndexBuilder;
use crate::catalog::{StaticSchemaSource, TableSchema};
use crate::index::{SchemaMetadata, SchemaVectorIndex, StorageLayout};
use std::time::Duration;
use tempfile::TempDir;

struct KeywordEmbedder {
    model: &'static str,
    keywords: &'static [&'static str],
    delay: Duration,
}

impl KeywordEmbedder {
    fn standard() -> Arc<Self> {
        Arc::new(Self {
            model: "keyword-stub",
            keywords: &["customer", "payment", "film"],
            delay: Duration::ZERO,
        })
    }
}

impl Embedder for KeywordEmbedder {
    fn model_id(&self) -> &str {
        self.model
    }

    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(texts
            .iter()
            .map(|text| {
                self.keywords
                    .iter()
                    .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

fn tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new("customer", vec!["customer_id".to_string()]),
        TableSchema::new("payment", vec!["payment_id".to_string()]),
        TableSchema::new("film", vec!["film_id".to_string()]),
    ]
}

fn settings(temp_dir: &TempDir) -> IndexSettings {
    IndexSettings::new(temp_dir.path().join("vectors"), "keyword-stub")
}

async fn build(settings: &IndexSettings, tables: Vec<TableSchema>) -> String {
    SchemaIndexBuilder::new(
        settings.clone(),
        Arc::new(StaticSchemaSource::new(tables)),
        KeywordEmbedder::standard(),
    )
    .build()
    .await
    .expect("build should succeed")
    .build_id
}

#[tokio::test]
async fn nearest_table_first() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    build(&settings, tables()).await;
    let retriever = SchemaRetriever::new(settings, KeywordEmbedder::standard());

    let results = retriever
        .retrieve("which payment was largest", Some(1))
        .await
        .expect("should retrieve");

    assert_eq!(
        results,
        vec![RetrievedTable {
            table_name: "payment".to_string(),
            schema_text: "Table: payment | Columns: payment_id".to_string(),
        }]
    );
}

#[tokio::test]
async fn default_top_k_applies() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir).with_default_top_k(2);
    build(&settings, tables()).await;
    let retriever = SchemaRetriever::new(settings, KeywordEmbedder::standard());

    let results = retriever
        .retrieve("customer", None)
        .await
        .expect("should retrieve");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].table_name, "customer");
}

#[tokio::test]
async fn scored_results_carry_distance_and_similarity() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    build(&settings, tables()).await;
    let retriever = SchemaRetriever::new(settings, KeywordEmbedder::standard());

    let results = retriever
        .retrieve_scored("film customer", Some(3))
        .await
        .expect("should retrieve");

    // Query [1, 0, 1]: customer and film at distance 1, payment at 3
    let names: Vec<&str> = results.iter().map(|r| r.table_name.as_str()).collect();
    assert_eq!(names, vec!["customer", "film", "payment"]);
    assert!((results[0].distance - 1.0).abs() < 1e-5);
    assert!((results[0].similarity - 0.5).abs() < 1e-5);
    assert!((results[2].distance - 3.0).abs() < 1e-5);
    assert_eq!(results[1].position, 2);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn blank_question_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let retriever = SchemaRetriever::new(settings(&temp_dir), KeywordEmbedder::standard());

    let result = retriever.retrieve("   ", Some(3)).await;

    let err = result.expect_err("should reject");
    assert_eq!(err.kind(), crate::ErrorKind::BadQuery);
}

#[tokio::test]
async fn zero_top_k_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let retriever = SchemaRetriever::new(settings(&temp_dir), KeywordEmbedder::standard());

    let result = retriever.retrieve("customer", Some(0)).await;

    assert!(matches!(result, Err(RagError::InvalidQuery(_))));
}

#[tokio::test]
async fn missing_index_is_reported() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let retriever = SchemaRetriever::new(settings(&temp_dir), KeywordEmbedder::standard());

    let err = retriever
        .retrieve("customer", Some(1))
        .await
        .expect_err("should fail without an index");

    assert_eq!(err.kind(), crate::ErrorKind::NoIndex);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn different_model_fails_loudly() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    build(&settings, tables()).await;

    let mut query_settings = settings.clone();
    query_settings.embedding_model = "other-model".to_string();
    let retriever = SchemaRetriever::new(query_settings, KeywordEmbedder::standard());

    let result = retriever.retrieve("customer", Some(1)).await;

    assert!(matches!(result, Err(RagError::ModelMismatch { .. })));
}

#[tokio::test]
async fn different_dimension_fails_loudly() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    build(&settings, tables()).await;

    let narrow = Arc::new(KeywordEmbedder {
        model: "keyword-stub",
        keywords: &["customer", "payment"],
        delay: Duration::ZERO,
    });
    let retriever = SchemaRetriever::new(settings, narrow);

    let result = retriever.retrieve("customer", Some(1)).await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn slow_embedding_is_retryable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    build(&settings, tables()).await;

    let slow = Arc::new(KeywordEmbedder {
        model: "keyword-stub",
        keywords: &["customer", "payment", "film"],
        delay: Duration::from_millis(500),
    });
    let retriever =
        SchemaRetriever::new(settings.with_embed_timeout(Duration::from_millis(50)), slow);

    let err = retriever
        .retrieve("customer", Some(1))
        .await
        .expect_err("should time out");

    assert!(matches!(err, RagError::EmbeddingTimeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cache_follows_rebuilds() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir).with_cache(true);
    let first = build(&settings, tables()).await;

    let retriever = SchemaRetriever::new(settings.clone(), KeywordEmbedder::standard());
    assert!(retriever.is_cached());
    retriever
        .retrieve("film", Some(3))
        .await
        .expect("should retrieve");
    assert_eq!(retriever.cached_build_id().await, Some(first));

    let second = build(
        &settings,
        vec![TableSchema::new("payment", vec!["amount".to_string()])],
    )
    .await;

    let results = retriever
        .retrieve("film", Some(3))
        .await
        .expect("should retrieve after rebuild");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].schema_text, "Table: payment | Columns: amount");
    assert_eq!(retriever.cached_build_id().await, Some(second));
}

#[tokio::test]
async fn cache_reuses_current_generation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir).with_cache(true);
    build(&settings, tables()).await;

    let retriever = SchemaRetriever::new(settings, KeywordEmbedder::standard());
    let first = retriever.load_index().await.expect("should load");
    let second = retriever.load_index().await.expect("should load again");

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn cache_does_not_outlive_deleted_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir).with_cache(true);
    build(&settings, tables()).await;

    let retriever = SchemaRetriever::new(settings.clone(), KeywordEmbedder::standard());
    retriever.refresh().await.expect("should refresh");
    std::fs::remove_dir_all(StorageLayout::new(&settings.storage_dir).root())
        .expect("should delete index");

    let result = retriever.retrieve("customer", Some(1)).await;

    assert!(matches!(result, Err(RagError::IndexNotFound { .. })));
}

#[tokio::test]
async fn zero_table_index_returns_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir);
    let layout = settings.layout();
    let staging = layout.begin_staging("empty-build").expect("should stage");
    SchemaVectorIndex::create_empty(&staging.index_path(), "empty-build", 3)
        .await
        .expect("should write empty table");
    SchemaMetadata::new("empty-build", "keyword-stub", 3, Vec::new(), Vec::new())
        .write_to(staging.metadata_path())
        .expect("should write metadata");
    staging.publish().expect("should publish");

    let retriever = SchemaRetriever::new(settings, KeywordEmbedder::standard());
    let results = retriever
        .retrieve("customer", Some(3))
        .await
        .expect("empty index should not fail");

    assert_eq!(results, Vec::new());
}

#[tokio::test]
async fn cached_generation_stays_readable_through_a_rebuild() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let settings = settings(&temp_dir).with_cache(true);
    let first = build(&settings, tables()).await;

    let retriever = SchemaRetriever::new(settings.clone(), KeywordEmbedder::standard());
    let held = retriever.load_index().await.expect("should load");

    let second = build(&settings, tables()).await;
    assert!(settings.layout().metadata_path().is_file());

    // The superseded build is kept until the next one is published
    let hits = held
        .nearest(&[1.0, 0.0, 0.0], 1)
        .await
        .expect("previous build should still be searchable");
    assert_eq!(held.build_id(), first);
    assert_eq!(hits[0].table_name, "customer");

    let results = retriever
        .retrieve("customer", Some(1))
        .await
        .expect("should retrieve the new build");
    assert_eq!(results[0].table_name, "customer");
    assert_eq!(retriever.cached_build_id().await, Some(second));
}

#[tokio::test]
async fn uncached_retriever_ignores_refresh() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let retriever = SchemaRetriever::new(settings(&temp_dir), KeywordEmbedder::standard());

    retriever.refresh().await.expect("refresh is a no-op");
    assert_eq!(retriever.cached_build_id().await, None);
}

#[test]
fn similarity_is_monotonic() {
    assert!((similarity_from_distance(0.0) - 1.0).abs() < f32::EPSILON);
    assert!(similarity_from_distance(0.5) > similarity_from_distance(2.0));
}
