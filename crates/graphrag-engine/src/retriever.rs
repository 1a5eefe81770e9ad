//! Subgraph retrieval: bounded traversal expansion around similarity hits.

use std::sync::Arc;

use graphrag_core::{GraphNode, SimilarityHit, SubgraphContext};
use graphrag_graph::{GraphBackend, GraphError};

use crate::config::RetrievalConfig;

/// Expands similarity hits into a bounded [`SubgraphContext`].
pub struct SubgraphRetriever {
    backend: Arc<dyn GraphBackend>,
    depth: usize,
    max_nodes: usize,
    max_relationships: usize,
    neighbor_limit: usize,
}

impl SubgraphRetriever {
    pub fn new(backend: Arc<dyn GraphBackend>, config: &RetrievalConfig) -> Self {
        Self {
            backend,
            depth: config.depth.max(1),
            max_nodes: config.max_nodes,
            max_relationships: config.max_relationships,
            neighbor_limit: config.neighbor_limit,
        }
    }

    /// Expand `hits` into `context`, failing closed.
    ///
    /// On a traversal error the context is cleared and `false` is returned.
    /// Writes go straight into `context`, so a caller that abandons this
    /// future still sees everything gathered so far.
    pub async fn retrieve(&self, hits: &[SimilarityHit], context: &mut SubgraphContext) -> bool {
        match self.expand(hits, context).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Traversal expansion failed, continuing without context");
                context.clear();
                false
            }
        }
    }

    /// Hit nodes first in rank order, then breadth-first neighbors of each
    /// hit (again in rank order) up to the configured depth and caps.
    pub async fn expand(
        &self,
        hits: &[SimilarityHit],
        context: &mut SubgraphContext,
    ) -> Result<(), GraphError> {
        for hit in hits {
            context.add_node(GraphNode::from(hit), self.max_nodes);
        }

        for hit in hits {
            if !context.contains_node(&hit.id) {
                continue;
            }
            let mut frontier = vec![hit.id.clone()];
            for _ in 0..self.depth {
                let mut next = Vec::new();
                for node_id in &frontier {
                    if self.is_full(context) {
                        return Ok(());
                    }
                    for neighbor in self.backend.neighbors(node_id, self.neighbor_limit).await? {
                        let neighbor_id = neighbor.node.id.clone();
                        let is_new = !context.contains_node(&neighbor_id);
                        if !context.add_node(neighbor.node, self.max_nodes) {
                            continue;
                        }
                        context.add_relationship(neighbor.relationship, self.max_relationships);
                        if is_new {
                            next.push(neighbor_id);
                        }
                    }
                }
                if next.is_empty() {
                    break;
                }
                frontier = next;
            }
        }
        Ok(())
    }

    fn is_full(&self, context: &SubgraphContext) -> bool {
        context.nodes.len() >= self.max_nodes
            && context.relationships.len() >= self.max_relationships
    }
}
