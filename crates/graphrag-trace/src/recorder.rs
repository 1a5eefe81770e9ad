//! Incremental trace recording during a workflow run.
//!
//! ```no_run
//! # use graphrag_trace::TraceRecorder;
//! let mut recorder = TraceRecorder::new("session-1", "Which patients have diabetes?");
//! recorder.transition("start", "plan", "");
//! recorder.event("similarity_search", "5 hits", serde_json::json!({"hits": 5}), true);
//! recorder.transition("plan", "retrieve", "");
//! let trace = recorder.finish("done");
//! assert!(trace.content_hash.is_some());
//! ```

use chrono::Utc;

use crate::{RunTrace, TraceEvent, TraceId, Transition};

/// Records transitions and events of one run, then seals them into a [`RunTrace`].
pub struct TraceRecorder {
    trace: RunTrace,
}

impl TraceRecorder {
    pub fn new(session_id: &str, question: &str) -> Self {
        Self {
            trace: RunTrace {
                id: TraceId::new(),
                session_id: session_id.to_string(),
                question: question.to_string(),
                transitions: Vec::new(),
                events: Vec::new(),
                status: None,
                started_at: Utc::now(),
                completed_at: None,
                content_hash: None,
            },
        }
    }

    pub fn transition(&mut self, from: &str, to: &str, note: &str) {
        self.trace.transitions.push(Transition {
            from: from.to_string(),
            to: to.to_string(),
            note: note.to_string(),
            at: Utc::now(),
        });
    }

    pub fn event(&mut self, kind: &str, description: &str, details: serde_json::Value, success: bool) {
        self.trace.events.push(TraceEvent {
            kind: kind.to_string(),
            description: description.to_string(),
            details,
            success,
            at: Utc::now(),
        });
    }

    /// The run id (available before finishing).
    pub fn id(&self) -> TraceId {
        self.trace.id
    }

    /// Read-only view of what has been recorded so far.
    pub fn current(&self) -> &RunTrace {
        &self.trace
    }

    /// Set the terminal status, completion time and content hash.
    pub fn finish(mut self, status: &str) -> RunTrace {
        self.trace.status = Some(status.to_string());
        self.trace.completed_at = Some(Utc::now());
        let hash = self.trace.compute_hash();
        self.trace.content_hash = Some(hash);
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_seals_trace() {
        let mut recorder = TraceRecorder::new("s1", "q");
        recorder.transition("start", "plan", "");
        recorder.transition("plan", "retrieve", "");
        recorder.event("similarity_search", "no hits", serde_json::json!({}), true);
        let id = recorder.id();
        let trace = recorder.finish("done");

        assert_eq!(trace.id, id);
        assert_eq!(trace.status.as_deref(), Some("done"));
        assert!(trace.completed_at.is_some());
        assert!(trace.verify_integrity());
        assert_eq!(trace.state_path(), vec!["start", "plan", "retrieve"]);
    }
}
