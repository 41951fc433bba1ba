use super::*;
use tempfile::TempDir;

fn sample() -> SchemaMetadata {
    SchemaMetadata::new(
        "build-1",
        "nomic-embed-text:latest",
        3,
        vec![
            "Table: customer | Columns: customer_id, first_name".to_string(),
            "Table: payment | Columns: payment_id, amount".to_string(),
        ],
        vec!["customer".to_string(), "payment".to_string()],
    )
}

#[test]
fn entry_pairs_name_with_text() {
    let metadata = sample();
    assert_eq!(metadata.len(), 2);
    assert_eq!(
        metadata.entry(1),
        Some(("payment", "Table: payment | Columns: payment_id, amount"))
    );
    assert_eq!(metadata.entry(2), None);
}

#[test]
fn write_then_read() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join(crate::index::METADATA_FILE);

    let metadata = sample();
    metadata.write_to(&path).expect("should write metadata");
    let loaded = SchemaMetadata::read_from(&path).expect("should read metadata");

    assert_eq!(loaded, metadata);
}

#[test]
fn missing_file_is_index_not_found() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = SchemaMetadata::read_from(&temp_dir.path().join("absent.json"));
    assert!(matches!(result, Err(RagError::IndexNotFound { .. })));
}

#[test]
fn malformed_file_is_index_not_found() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("table_names.json");
    fs::write(&path, "{\"table_names\": [").expect("should write");

    let result = SchemaMetadata::read_from(&path);
    assert!(matches!(result, Err(RagError::IndexNotFound { .. })));
}

#[test]
fn unequal_lists_are_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("table_names.json");

    let mut metadata = sample();
    metadata.schema_texts.pop();
    metadata.write_to(&path).expect("should write metadata");

    let err = SchemaMetadata::read_from(&path).expect_err("should reject metadata");
    let RagError::IndexNotFound { reason, .. } = err else {
        panic!("expected IndexNotFound");
    };
    assert!(reason.contains("1 schema texts but 2 table names"));
}

#[test]
fn unknown_format_version_is_rejected() {
    let mut metadata = sample();
    metadata.format_version = 99;
    assert!(metadata.validate().is_err());
}
