use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Result;
use crate::index::{LoadedIndex, SchemaMetadata, StorageLayout};

/// Process-wide holder of the most recently loaded index generation
///
/// The whole `LoadedIndex` is swapped at once, so a reader sees either the
/// old pair or the new pair.
#[derive(Default)]
pub struct IndexCache {
    current: RwLock<Option<Arc<LoadedIndex>>>,
}

impl IndexCache {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached generation if still current on disk, otherwise a fresh load
    #[inline]
    pub async fn get_or_load(&self, layout: &StorageLayout) -> Result<Arc<LoadedIndex>> {
        let on_disk = SchemaMetadata::read_from(&layout.metadata_path())?.build_id;

        {
            let current = self.current.read().await;
            if let Some(index) = current.as_ref().filter(|i| i.build_id() == on_disk) {
                return Ok(Arc::clone(index));
            }
        }

        let mut current = self.current.write().await;
        if let Some(index) = current.as_ref().filter(|i| i.build_id() == on_disk) {
            return Ok(Arc::clone(index));
        }

        let loaded = Arc::new(LoadedIndex::load(layout).await?);
        info!(
            "Cached index build {} ({} tables)",
            loaded.build_id(),
            loaded.len()
        );
        *current = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Replace the cached generation
    #[inline]
    pub async fn install(&self, index: Arc<LoadedIndex>) {
        debug!("Installing index build {}", index.build_id());
        *self.current.write().await = Some(index);
    }

    #[inline]
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Build id of the cached generation, if any
    #[inline]
    pub async fn cached_build_id(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|index| index.build_id().to_string())
    }
}
