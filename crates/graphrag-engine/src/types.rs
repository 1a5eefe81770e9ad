//! Request, response and per-run state types.

use graphrag_core::{
    GraphNode, GraphRagError, GraphRelationship, GraphSchema, SimilarityHit,
    SubgraphContext, Turn, WorkflowStatus,
};
use graphrag_trace::TraceRecorder;
use serde::{Deserialize, Serialize};

/// A question, optionally continuing an earlier session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The answer plus the explainability payload.
///
/// Always well-formed, whatever the terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub cypher_query: String,
    pub answer: String,
    pub traversal_paths: Vec<GraphRelationship>,
    pub nodes_used: Vec<GraphNode>,
    pub similar_nodes_found: Vec<SimilarityHit>,
    pub plan: Vec<String>,
    pub steps_taken: usize,
    pub confidence: f64,
    pub session_id: String,
    pub status: WorkflowStatus,
    pub execution_attempts: usize,
}

/// A response together with details that are never shown to end users.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub response: AskResponse,
    /// Internal reason for a FAILED or TIMEOUT run.
    pub failure_reason: Option<String>,
    /// The answer still contained denylisted terms after the rephrase retry.
    pub answer_flagged: bool,
    /// Stages the answer synthesizer went through.
    pub answer_plan_summary: Vec<String>,
    pub refinements: usize,
    pub trace_id: String,
}

/// Mutable record threaded through one workflow run. Never shared.
pub struct WorkflowState {
    pub session_id: String,
    pub question: String,
    pub history: Vec<Turn>,
    pub plan: Vec<String>,
    pub schema: Option<GraphSchema>,
    pub similar_nodes: Vec<SimilarityHit>,
    pub subgraph: SubgraphContext,
    pub query: String,
    /// Internal reason of the last failure, never shown to end users.
    pub failure_reason: Option<String>,
    pub refinements: usize,
    pub broadenings: usize,
    pub execution_attempts: usize,
    pub answer: String,
    pub confidence: f64,
    pub steps_taken: usize,
    pub answer_flagged: bool,
    pub answer_plan_summary: Vec<String>,
    pub trace: TraceRecorder,
}

impl WorkflowState {
    pub fn new(session_id: impl Into<String>, question: impl Into<String>, history: Vec<Turn>) -> Self {
        let session_id = session_id.into();
        let question = question.into();
        let trace = TraceRecorder::new(&session_id, &question);
        Self {
            session_id,
            question,
            history,
            plan: Vec::new(),
            schema: None,
            similar_nodes: Vec::new(),
            subgraph: SubgraphContext::default(),
            query: String::new(),
            failure_reason: None,
            refinements: 0,
            broadenings: 0,
            execution_attempts: 0,
            answer: String::new(),
            confidence: 0.0,
            steps_taken: 0,
            answer_flagged: false,
            answer_plan_summary: Vec::new(),
            trace,
        }
    }

    /// Count one step, failing once `max_steps` would be exceeded.
    pub fn take_step(&mut self, max_steps: usize) -> Result<(), GraphRagError> {
        if self.steps_taken >= max_steps {
            return Err(GraphRagError::Internal(format!(
                "step budget of {max_steps} exhausted"
            )));
        }
        self.steps_taken += 1;
        Ok(())
    }

    /// Mean similarity of the retrieved hits, `0.0` when there are none.
    pub fn mean_hit_score(&self) -> f64 {
        if self.similar_nodes.is_empty() {
            return 0.0;
        }
        self.similar_nodes.iter().map(|h| h.score).sum::<f64>() / self.similar_nodes.len() as f64
    }

    pub fn to_response(&self, status: WorkflowStatus) -> AskResponse {
        AskResponse {
            question: self.question.clone(),
            cypher_query: self.query.clone(),
            answer: self.answer.clone(),
            traversal_paths: self.subgraph.relationships.clone(),
            nodes_used: self.subgraph.nodes.clone(),
            similar_nodes_found: self.similar_nodes.clone(),
            plan: self.plan.clone(),
            steps_taken: self.steps_taken,
            confidence: self.confidence,
            session_id: self.session_id.clone(),
            status,
            execution_attempts: self.execution_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_camel_case_session_id() {
        let req: AskRequest =
            serde_json::from_str(r#"{"question": "q", "sessionId": "abc"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));

        let bare: AskRequest = serde_json::from_str(r#"{"question": "q"}"#).unwrap();
        assert!(bare.session_id.is_none());
    }

    #[test]
    fn step_budget_is_enforced() {
        let mut state = WorkflowState::new("s", "q", Vec::new());
        assert!(state.take_step(2).is_ok());
        assert!(state.take_step(2).is_ok());
        assert!(state.take_step(2).is_err());
        assert_eq!(state.steps_taken, 2);
    }

    #[test]
    fn response_serializes_status_and_paths() {
        let mut state = WorkflowState::new("s1", "Which patients have diabetes?", Vec::new());
        state.subgraph.relationships.push(GraphRelationship {
            start: "a".into(),
            rel_type: "HAS_CONDITION".into(),
            end: "b".into(),
        });
        let value = serde_json::to_value(state.to_response(WorkflowStatus::Timeout)).unwrap();
        assert_eq!(value["status"], "timeout");
        assert_eq!(value["traversal_paths"][0]["type"], "HAS_CONDITION");
        assert_eq!(value["session_id"], "s1");
    }
}
