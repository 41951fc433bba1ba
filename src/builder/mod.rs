// Builder module
// Turns the database catalog into a published schema index


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::SchemaSource;
use crate::embeddings::{Embedder, embed_with_deadline};
use crate::index::{
    IndexSettings, SchemaMetadata, SchemaVectorIndex, StagingArea, published_build,
};
use crate::{RagError, Result};

/// Outcome of a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub build_id: String,
    pub table_count: usize,
    pub dimension: usize,
    pub storage_dir: PathBuf,
    /// Indexed tables in position order
    pub table_names: Vec<String>,
}

/// Builds the vector index and metadata pair from a schema source
pub struct SchemaIndexBuilder {
    settings: IndexSettings,
    source: Arc<dyn SchemaSource>,
    embedder: Arc<dyn Embedder>,
    // Serialises builds issued through this builder
    build_lock: Mutex<()>,
}

impl SchemaIndexBuilder {
    #[inline]
    pub fn new(
        settings: IndexSettings,
        source: Arc<dyn SchemaSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            settings,
            source,
            embedder,
            build_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Read every table, embed its schema text and publish both artifacts
    ///
    /// On any failure the published build stays as it was. A database with
    /// no tables is [`RagError::NoTables`] and writes nothing. After
    /// publishing, vector tables older than the previous build are pruned.
    #[inline]
    pub async fn build(&self) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        let started = Instant::now();

        let tables = self.source.tables().await?;
        if tables.is_empty() {
            warn!("No tables found in {}", self.source.describe());
            return Err(RagError::NoTables {
                database: self.source.describe(),
            });
        }

        let table_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        let schema_texts: Vec<String> = tables.iter().map(|t| t.schema_text()).collect();
        info!(
            "Embedding {} table schemas with {}",
            tables.len(),
            self.embedder.model_id()
        );

        let embeddings = embed_with_deadline(
            Arc::clone(&self.embedder),
            schema_texts.clone(),
            self.settings.embed_timeout,
        )
        .await?;

        let dimension = embeddings.first().map_or(0, Vec::len);
        if let Some(expected) = self.settings.expected_dimension {
            if dimension != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }

        let build_id = Uuid::new_v4().to_string();
        let layout = self.settings.layout();
        let previous = published_build(&layout).ok();

        let entries: Vec<(String, Vec<f32>)> =
            table_names.iter().cloned().zip(embeddings).collect();
        let metadata = SchemaMetadata::new(
            build_id.as_str(),
            self.embedder.model_id(),
            dimension,
            schema_texts,
            table_names.clone(),
        );

        let staging = layout.begin_staging(&build_id)?;
        if let Err(e) = Self::write_generation(staging, &entries, &metadata).await {
            if let Err(cleanup) = SchemaVectorIndex::drop_build(&layout.index_path(), &build_id).await
            {
                warn!(
                    "Failed to remove vectors of failed build {}: {}",
                    build_id, cleanup
                );
            }
            return Err(e);
        }

        let mut keep = vec![build_id.as_str()];
        keep.extend(previous.as_deref());
        if let Err(e) = SchemaVectorIndex::prune(&layout.index_path(), &keep).await {
            warn!("Failed to prune superseded builds: {}", e);
        }

        info!(
            "Built schema index {} with {} tables in {:.2?}",
            build_id,
            table_names.len(),
            started.elapsed()
        );

        Ok(BuildReport {
            build_id,
            table_count: table_names.len(),
            dimension,
            storage_dir: layout.root().to_path_buf(),
            table_names,
        })
    }

    async fn write_generation(
        staging: StagingArea,
        entries: &[(String, Vec<f32>)],
        metadata: &SchemaMetadata,
    ) -> Result<()> {
        debug!(
            "Writing build {} to {}",
            staging.build_id(),
            staging.index_path().display()
        );
        SchemaVectorIndex::create(&staging.index_path(), staging.build_id(), entries).await?;
        metadata.write_to(staging.metadata_path())?;
        staging.publish()
    }
}
