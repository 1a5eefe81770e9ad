//! graphrag-engine: Question answering over a Neo4j knowledge graph.
//!
//! Each question runs through a bounded state machine: plan, retrieve a
//! supporting subgraph (similarity search plus traversal expansion),
//! generate and refine a read statement, execute it, and synthesize a
//! plain-language answer. The run is limited by a step budget and a
//! wall-clock budget, and always ends in a well-formed [`AskResponse`]
//! carrying the explainability payload. Every run records a hashed trace.

pub mod answer;
pub mod config;
pub mod cypher;
pub mod index;
pub mod jargon;
pub mod prompts;
pub mod refiner;
pub mod retriever;
pub mod trace;
pub mod types;
pub mod workflow;

pub use config::{load_settings, Settings};
pub use types::{AskRequest, AskResponse, WorkflowReport};
pub use workflow::{GraphRagEngine, WorkflowPhase, EMPTY_RESULT_CONFIDENCE, LOW_CONFIDENCE_THRESHOLD};
