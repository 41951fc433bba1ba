#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

pub const FORMAT_VERSION: u32 = 1;

/// Parallel table metadata for one index build
///
/// `schema_texts[i]` and `table_names[i]` describe the vector stored at
/// position `i` of the index written by the same build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub format_version: u32,
    /// Identifier shared with every row of the matching vector index
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimension: usize,
    pub schema_texts: Vec<String>,
    pub table_names: Vec<String>,
}

impl SchemaMetadata {
    #[inline]
    pub fn new(
        build_id: impl Into<String>,
        embedding_model: impl Into<String>,
        dimension: usize,
        schema_texts: Vec<String>,
        table_names: Vec<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            build_id: build_id.into(),
            built_at: Utc::now(),
            embedding_model: embedding_model.into(),
            dimension,
            schema_texts,
            table_names,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table_names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
    }

    /// `(table_name, schema_text)` at `position`
    #[inline]
    pub fn entry(&self, position: usize) -> Option<(&str, &str)> {
        let name = self.table_names.get(position)?;
        let text = self.schema_texts.get(position)?;
        Some((name.as_str(), text.as_str()))
    }

    /// Check the internal consistency of a decoded metadata file
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported metadata format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        if self.schema_texts.len() != self.table_names.len() {
            return Err(format!(
                "metadata lists {} schema texts but {} table names",
                self.schema_texts.len(),
                self.table_names.len()
            ));
        }
        if self.build_id.is_empty() {
            return Err("metadata has no build id".to_string());
        }
        Ok(())
    }

    /// Write as JSON and flush to disk
    #[inline]
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to encode metadata: {}", e)))?;

        let mut file = File::create(path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read and validate a metadata file
    ///
    /// A missing, unparseable or inconsistent file is [`RagError::IndexNotFound`].
    #[inline]
    pub fn read_from(path: &Path) -> Result<Self> {
        let not_found = |reason: String| RagError::IndexNotFound {
            path: path.to_path_buf(),
            reason,
        };

        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found("metadata file is missing".to_string()));
            }
            Err(e) => return Err(not_found(format!("metadata file is unreadable: {}", e))),
        };

        let metadata: Self = serde_json::from_slice(&content)
            .map_err(|e| not_found(format!("metadata file is malformed: {}", e)))?;
        metadata.validate().map_err(not_found)?;

        Ok(metadata)
    }
}
