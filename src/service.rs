// Service module
// Pairs a builder and retriever over one storage directory

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::builder::{BuildReport, SchemaIndexBuilder};
use crate::catalog::SchemaSource;
use crate::embeddings::Embedder;
use crate::index::IndexSettings;
use crate::retriever::{RetrievedTable, SchemaRetriever, ScoredTable};

/// Entry point for callers that both rebuild and query the index
pub struct SchemaService {
    builder: SchemaIndexBuilder,
    retriever: SchemaRetriever,
}

impl SchemaService {
    #[inline]
    pub fn new(
        settings: IndexSettings,
        source: Arc<dyn SchemaSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            builder: SchemaIndexBuilder::new(settings.clone(), source, Arc::clone(&embedder)),
            retriever: SchemaRetriever::new(settings, embedder),
        }
    }

    #[inline]
    pub fn retriever(&self) -> &SchemaRetriever {
        &self.retriever
    }

    /// Build a new generation and make it visible to the next retrieval
    #[inline]
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let report = self.builder.build().await?;
        self.retriever.refresh().await?;
        info!("Serving index build {}", report.build_id);
        Ok(report)
    }

    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedTable>> {
        self.retriever.retrieve(question, top_k).await
    }

    #[inline]
    pub async fn retrieve_scored(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredTable>> {
        self.retriever.retrieve_scored(question, top_k).await
    }
}
