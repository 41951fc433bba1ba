// Schema index module
// The persisted artifact pair: a LanceDB vector index plus parallel table metadata


pub mod layout;
pub mod metadata;
pub mod vector_store;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::settings::DEFAULT_TOP_K;
use crate::{RagError, Result};

pub use layout::{INDEX_FILE, METADATA_FILE, StagingArea, StorageLayout};
pub use metadata::SchemaMetadata;
pub use vector_store::{Neighbor, SchemaVectorIndex, table_name_for};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOAD_ATTEMPTS: usize = 3;

/// Build id named by the published metadata
#[inline]
pub fn published_build(layout: &StorageLayout) -> Result<String> {
    Ok(SchemaMetadata::read_from(&layout.metadata_path())?.build_id)
}

/// Settings shared by [`crate::SchemaIndexBuilder`] and [`crate::SchemaRetriever`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Directory that holds `schema.index` and `table_names.json`
    pub storage_dir: PathBuf,
    /// Model identifier recorded at build time and checked at query time
    pub embedding_model: String,
    /// Output dimension the model is configured to produce, if known
    pub expected_dimension: Option<usize>,
    pub default_top_k: usize,
    /// Deadline for one embedding call
    pub embed_timeout: Duration,
    pub cache_index: bool,
}

impl IndexSettings {
    #[inline]
    pub fn new(storage_dir: impl Into<PathBuf>, embedding_model: impl Into<String>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            embedding_model: embedding_model.into(),
            expected_dimension: None,
            default_top_k: DEFAULT_TOP_K,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            cache_index: false,
        }
    }

    #[inline]
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    #[inline]
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    #[inline]
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_index = enabled;
        self
    }

    #[inline]
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.storage_dir)
    }
}

/// Both artifacts of one build, opened and cross-checked
pub struct LoadedIndex {
    metadata: SchemaMetadata,
    vectors: SchemaVectorIndex,
}

impl LoadedIndex {
    /// Open the artifact pair and verify it describes a single build
    ///
    /// Any missing, unreadable or inconsistent artifact is reported as
    /// [`RagError::IndexNotFound`] so callers never search a torn pair. A
    /// build whose vectors were pruned between reading the metadata and
    /// opening them is retried against the newer metadata.
    pub async fn load(layout: &StorageLayout) -> Result<Self> {
        let mut attempt = 1;
        loop {
            let metadata = SchemaMetadata::read_from(&layout.metadata_path())?;
            let build_id = metadata.build_id.clone();
            match Self::load_build(layout, metadata).await {
                Err(e @ RagError::IndexNotFound { .. }) if attempt < MAX_LOAD_ATTEMPTS => {
                    if published_build(layout)? == build_id {
                        return Err(e);
                    }
                    debug!("Build {} was superseded while loading: {}", build_id, e);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn load_build(layout: &StorageLayout, metadata: SchemaMetadata) -> Result<Self> {
        let vectors = SchemaVectorIndex::open(&layout.index_path(), &metadata.build_id).await?;

        let count = vectors.count().await.map_err(|e| layout.not_found(e))?;
        if count != metadata.len() {
            warn!(
                "Index at {} holds {} vectors but metadata lists {} tables",
                layout.root().display(),
                count,
                metadata.len()
            );
            return Err(layout.not_found(format!(
                "index holds {} vectors but metadata lists {} tables",
                count,
                metadata.len()
            )));
        }

        if !metadata.is_empty() && vectors.dimension() != metadata.dimension {
            return Err(layout.not_found(format!(
                "index stores {}-dimensional vectors but metadata records {}",
                vectors.dimension(),
                metadata.dimension
            )));
        }

        debug!(
            "Loaded index build {} with {} tables",
            metadata.build_id,
            metadata.len()
        );

        Ok(Self { metadata, vectors })
    }

    #[inline]
    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }

    #[inline]
    pub fn vectors(&self) -> &SchemaVectorIndex {
        &self.vectors
    }

    #[inline]
    pub fn build_id(&self) -> &str {
        &self.metadata.build_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// k-nearest-neighbour search, nearest first, with `k` capped at the table count
    ///
    /// Every hit is checked against the metadata entry at its position.
    pub async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.metadata.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.metadata.dimension,
                actual: query.len(),
            });
        }

        // A generation replaced mid-read surfaces as a read failure
        let neighbors = self
            .vectors
            .search(query, k)
            .await
            .map_err(|e| match e {
                RagError::Database(reason) => RagError::IndexNotFound {
                    path: self.vectors.path().to_path_buf(),
                    reason,
                },
                other => other,
            })?;

        for neighbor in &neighbors {
            let expected = self.metadata.table_names.get(neighbor.position);
            if neighbor.build_id != self.metadata.build_id
                || expected.map(String::as_str) != Some(neighbor.table_name.as_str())
            {
                return Err(RagError::IndexNotFound {
                    path: self.vectors.path().to_path_buf(),
                    reason: format!(
                        "vector at position {} ({} from build {}) does not match metadata",
                        neighbor.position, neighbor.table_name, neighbor.build_id
                    ),
                });
            }
        }

        Ok(neighbors)
    }
}
