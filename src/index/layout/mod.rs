
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RagError, Result};

/// LanceDB directory holding one vector table per build
pub const INDEX_FILE: &str = "schema.index";
/// JSON file holding the schema texts and table names of the published build
pub const METADATA_FILE: &str = "table_names.json";

/// Well-known artifact paths under one storage directory
///
/// Only the two artifacts and hidden temporary metadata files are ever
/// written here. Anything else in the directory is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    #[inline]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Whether both artifacts are present
    #[inline]
    pub fn exists(&self) -> bool {
        self.index_path().exists() && self.metadata_path().exists()
    }

    #[inline]
    pub fn not_found(&self, reason: impl Display) -> RagError {
        RagError::IndexNotFound {
            path: self.root.clone(),
            reason: reason.to_string(),
        }
    }

    /// Prepare a build: create the storage and index directories and pick a
    /// temporary metadata path next to the live one
    #[inline]
    pub fn begin_staging(&self, build_id: &str) -> Result<StagingArea> {
        fs::create_dir_all(self.index_path())?;

        let staged_metadata = self
            .root
            .join(format!(".{}.{}.tmp", METADATA_FILE, Uuid::new_v4()));
        debug!(
            "Staging build {} metadata at {}",
            build_id,
            staged_metadata.display()
        );

        Ok(StagingArea {
            target: self.clone(),
            build_id: build_id.to_string(),
            staged_metadata,
            published: false,
        })
    }
}

/// A build in progress
///
/// Vectors go straight into the index directory under a table private to
/// this build. The metadata is written to a temporary file and renamed over
/// `table_names.json` on publish, which is the single step that exposes the
/// new build. The temporary file is removed on drop unless published.
#[derive(Debug)]
pub struct StagingArea {
    target: StorageLayout,
    build_id: String,
    staged_metadata: PathBuf,
    published: bool,
}

impl StagingArea {
    #[inline]
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// LanceDB directory the build's vector table is written into
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.target.index_path()
    }

    /// Temporary path the build's metadata is written to
    #[inline]
    pub fn metadata_path(&self) -> &Path {
        &self.staged_metadata
    }

    /// Atomically replace `table_names.json` with the staged metadata
    #[inline]
    pub fn publish(mut self) -> Result<()> {
        if !self.staged_metadata.is_file() {
            return Err(RagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "staged metadata is missing",
            )));
        }

        let target = self.target.metadata_path();
        fs::rename(&self.staged_metadata, &target)?;
        self.published = true;

        info!(
            "Published schema index build {} to {}",
            self.build_id,
            self.target.root().display()
        );
        Ok(())
    }
}

impl Drop for StagingArea {
    #[inline]
    fn drop(&mut self) {
        if self.published {
            return;
        }
        match fs::remove_file(&self.staged_metadata) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staged metadata {}: {}",
                self.staged_metadata.display(),
                e
            ),
        }
    }
}
