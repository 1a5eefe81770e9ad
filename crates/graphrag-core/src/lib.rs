//! graphrag-core: Shared data model and error taxonomy for the GraphRAG core.
//!
//! This crate provides the foundational types used across all components:
//! - Schema snapshot and similarity hits produced by the graph index
//! - Subgraph context (nodes + relationships) used as retrieval evidence
//! - Conversation turns stored per session
//! - The error taxonomy shared by the workflow

pub mod error;
pub mod types;

pub use error::{ErrorKind, GraphRagError};
pub use types::{
    GraphNode, GraphRelationship, GraphSchema, Row, SimilarityHit, SubgraphContext, Turn,
    WorkflowStatus,
};
