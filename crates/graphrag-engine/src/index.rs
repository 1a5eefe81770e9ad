//! Schema and embedding index access.

use std::sync::Arc;
use std::time::{Duration, Instant};

use graphrag_core::{GraphRagError, GraphSchema, SimilarityHit};
use graphrag_graph::GraphBackend;
use graphrag_llm::Embedder;
use tokio::sync::RwLock;

use crate::config::RetrievalConfig;

struct CachedSchema {
    schema: GraphSchema,
    fetched_at: Instant,
}

/// Cached schema snapshots plus nearest-neighbour lookup over node embeddings.
pub struct IndexAccessor {
    backend: Arc<dyn GraphBackend>,
    embedder: Arc<dyn Embedder>,
    min_score: f64,
    schema_ttl: Duration,
    cache: RwLock<Option<CachedSchema>>,
}

impl IndexAccessor {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            backend,
            embedder,
            min_score: config.min_score,
            schema_ttl: Duration::from_secs(config.schema_ttl_secs),
            cache: RwLock::new(None),
        }
    }

    /// The schema snapshot, re-fetched once it is older than the TTL.
    pub async fn fetch_schema(&self) -> Result<GraphSchema, GraphRagError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.schema_ttl {
                    return Ok(cached.schema.clone());
                }
            }
        }
        self.refresh_schema().await
    }

    /// Fetch the schema now and replace the cached snapshot.
    pub async fn refresh_schema(&self) -> Result<GraphSchema, GraphRagError> {
        let schema = self
            .backend
            .fetch_schema()
            .await
            .map_err(|e| GraphRagError::BackendUnavailable(e.to_string()))?;

        tracing::debug!(
            labels = schema.labels.len(),
            relationship_types = schema.relationship_types.len(),
            "Schema refreshed"
        );
        *self.cache.write().await = Some(CachedSchema {
            schema: schema.clone(),
            fetched_at: Instant::now(),
        });
        Ok(schema)
    }

    /// Top-`k` nodes similar to `text`, scoring at least the configured minimum.
    ///
    /// No hit above the threshold yields an empty list, not an error.
    pub async fn similarity_search(
        &self,
        text: &str,
        k: usize,
    ) -> Result<Vec<SimilarityHit>, GraphRagError> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| GraphRagError::EmbeddingService(e.to_string()))?;

        let mut hits = self
            .backend
            .vector_search(&embedding, k)
            .await
            .map_err(GraphRagError::from)?;

        hits.retain(|h| h.score >= self.min_score);
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}
