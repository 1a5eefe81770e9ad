//! The read-only graph surface consumed by the workflow.

use async_trait::async_trait;
use graphrag_core::{GraphNode, GraphRelationship, GraphSchema, Row, SimilarityHit};

use crate::client::{GraphClient, GraphError};

/// A neighbor result: node + the connecting relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub node: GraphNode,
    pub relationship: GraphRelationship,
}

/// Read operations the workflow needs from a graph database.
///
/// Implemented by [`GraphClient`] for Neo4j and by in-memory fakes in tests.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Introspect labels, relationship types and per-label property names.
    async fn fetch_schema(&self) -> Result<GraphSchema, GraphError>;

    /// Top-`k` nodes nearest to `embedding`, ordered by descending score.
    async fn vector_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit>, GraphError>;

    /// Direct relationships of a node (any direction), at most `limit`.
    async fn neighbors(&self, node_id: &str, limit: usize) -> Result<Vec<Neighbor>, GraphError>;

    /// Run an already-validated read statement and return its rows.
    async fn execute_read(&self, statement: &str) -> Result<Vec<Row>, GraphError>;
}

#[async_trait]
impl GraphBackend for GraphClient {
    async fn fetch_schema(&self) -> Result<GraphSchema, GraphError> {
        GraphClient::fetch_schema(self).await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit>, GraphError> {
        match self.index_search(embedding, k).await {
            Ok(hits) => Ok(hits),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                tracing::warn!(
                    index = %self.vector_index(),
                    error = %e,
                    "Vector index search failed, ranking embedded nodes in process"
                );
                self.scan_search(embedding, k).await
            }
        }
    }

    async fn neighbors(&self, node_id: &str, limit: usize) -> Result<Vec<Neighbor>, GraphError> {
        GraphClient::neighbors(self, node_id, limit).await
    }

    async fn execute_read(&self, statement: &str) -> Result<Vec<Row>, GraphError> {
        GraphClient::execute_read(self, statement).await
    }
}
