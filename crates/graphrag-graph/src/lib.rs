//! GraphRAG Graph: Neo4j read access for question answering.
//!
//! This crate is the single point through which the workflow touches the
//! graph database. It never issues writes: schema introspection, vector
//! lookups, neighbor expansion and execution of validated read statements
//! all flow through [`GraphBackend`].

pub mod backend;
pub mod client;
pub mod queries;

pub use backend::{GraphBackend, Neighbor};
pub use client::{GraphClient, GraphConfig, GraphError};
