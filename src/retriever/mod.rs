// Retriever module
// Resolves a question to the nearest table schemas in the published index

#[cfg(test)]
mod tests;

pub mod cache;

use std::sync::Arc;

use tracing::{debug, info};

use crate::embeddings::{Embedder, embed_with_deadline};
use crate::index::{IndexSettings, LoadedIndex, published_build};
use crate::{RagError, Result};

pub use cache::IndexCache;

const MAX_SEARCH_ATTEMPTS: usize = 3;

/// One retrieved table, nearest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedTable {
    pub table_name: String,
    pub schema_text: String,
}

/// A retrieved table with its ranking details
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTable {
    pub table_name: String,
    pub schema_text: String,
    /// Position in the index and metadata
    pub position: usize,
    /// Squared L2 distance; lower is more relevant
    pub distance: f32,
    /// `1 / (1 + distance)`, for display only
    pub similarity: f32,
}

impl From<ScoredTable> for RetrievedTable {
    #[inline]
    fn from(scored: ScoredTable) -> Self {
        Self {
            table_name: scored.table_name,
            schema_text: scored.schema_text,
        }
    }
}

#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

pub struct SchemaRetriever {
    settings: IndexSettings,
    embedder: Arc<dyn Embedder>,
    cache: Option<IndexCache>,
}

impl SchemaRetriever {
    /// Create a retriever; cached if `settings.cache_index` is set
    #[inline]
    pub fn new(settings: IndexSettings, embedder: Arc<dyn Embedder>) -> Self {
        let cache = settings.cache_index.then(IndexCache::new);
        Self {
            settings,
            embedder,
            cache,
        }
    }

    #[inline]
    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// The `min(top_k, N)` most relevant tables, nearest first
    ///
    /// `top_k` defaults to the configured value.
    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedTable>> {
        Ok(self
            .retrieve_scored(question, top_k)
            .await?
            .into_iter()
            .map(RetrievedTable::from)
            .collect())
    }

    #[inline]
    pub async fn retrieve_scored(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredTable>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        if top_k == 0 {
            return Err(RagError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }

        let mut query: Option<Vec<f32>> = None;
        let mut attempt = 1;
        let (index, neighbors) = loop {
            let index = self.load_index().await?;
            if index.metadata().embedding_model != self.settings.embedding_model {
                return Err(RagError::ModelMismatch {
                    indexed: index.metadata().embedding_model.clone(),
                    configured: self.settings.embedding_model.clone(),
                });
            }
            if index.is_empty() {
                debug!("Index build {} has no tables", index.build_id());
                return Ok(Vec::new());
            }

            let vector = match query.take() {
                Some(vector) => vector,
                None => self.embed_question(question).await?,
            };
            match index.nearest(&vector, top_k).await {
                Err(e @ RagError::IndexNotFound { .. }) if attempt < MAX_SEARCH_ATTEMPTS => {
                    if published_build(&self.settings.layout())? == index.build_id() {
                        return Err(e);
                    }
                    debug!(
                        "Build {} was pruned during search, retrying on the published build",
                        index.build_id()
                    );
                    query = Some(vector);
                    attempt += 1;
                }
                result => break (index, result?),
            }
        };

        let results: Vec<ScoredTable> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let (name, text) = index.metadata().entry(neighbor.position)?;
                Some(ScoredTable {
                    table_name: name.to_string(),
                    schema_text: text.to_string(),
                    position: neighbor.position,
                    distance: neighbor.distance,
                    similarity: similarity_from_distance(neighbor.distance),
                })
            })
            .collect();

        info!(
            "Retrieved {} of {} tables for question ({} chars)",
            results.len(),
            index.len(),
            question.len()
        );
        Ok(results)
    }

    /// Embed a single question under the configured deadline
    #[inline]
    pub async fn embed_question(&self, question: &str) -> Result<Vec<f32>> {
        let mut vectors = embed_with_deadline(
            Arc::clone(&self.embedder),
            vec![question.to_string()],
            self.settings.embed_timeout,
        )
        .await?;

        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("no embedding returned for question".to_string()))
    }

    /// Current index generation, from the cache when enabled
    #[inline]
    pub async fn load_index(&self) -> Result<Arc<LoadedIndex>> {
        let layout = self.settings.layout();
        match &self.cache {
            Some(cache) => cache.get_or_load(&layout).await,
            None => Ok(Arc::new(LoadedIndex::load(&layout).await?)),
        }
    }

    /// Load the published generation and install it in the cache
    ///
    /// No-op without a cache.
    #[inline]
    pub async fn refresh(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            let index = LoadedIndex::load(&self.settings.layout()).await?;
            cache.install(Arc::new(index)).await;
        }
        Ok(())
    }

    #[inline]
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate().await;
        }
    }

    /// Build id currently held by the cache
    #[inline]
    pub async fn cached_build_id(&self) -> Option<String> {
        match &self.cache {
            Some(cache) => cache.cached_build_id().await,
            None => None,
        }
    }
}
