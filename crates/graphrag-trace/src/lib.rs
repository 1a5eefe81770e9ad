//! GraphRAG Trace: tamper-evident capture of workflow runs.
//!
//! A run trace records how an answer was produced: every state transition
//! of the workflow, each retrieval, generation, execution and validation
//! event, and the terminal status. Traces are content-hashed with BLAKE3
//! and can be stored as dated JSON files for later audit.

pub mod hash;
pub mod recorder;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use recorder::TraceRecorder;
pub use store::{FileTraceStore, TraceError};

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TraceId(pub Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A move of the workflow from one named state to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub from: String,
    pub to: String,
    /// Short reason for the move (e.g. "syntax error, repairing").
    pub note: String,
    pub at: DateTime<Utc>,
}

/// Something the workflow did while in a state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEvent {
    /// Event type (e.g. "similarity_search", "execute", "jargon_check").
    pub kind: String,
    pub description: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// The complete record of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunTrace {
    pub id: TraceId,
    pub session_id: String,
    pub question: String,
    pub transitions: Vec<Transition>,
    pub events: Vec<TraceEvent>,
    /// Terminal status class, set on finish.
    pub status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// BLAKE3 content hash (hex), set on finish.
    pub content_hash: Option<String>,
}

impl RunTrace {
    /// Hash of every field except `content_hash` itself.
    pub fn compute_hash(&self) -> String {
        hash::compute_trace_hash(self)
    }

    /// Whether the stored hash matches the current content.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    /// Names of the states visited, starting with the first `from`.
    pub fn state_path(&self) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.first() {
            path.push(first.from.as_str());
        }
        path.extend(self.transitions.iter().map(|t| t.to.as_str()));
        path
    }
}
