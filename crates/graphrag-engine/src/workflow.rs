//! Workflow orchestrator.
//!
//! ```text
//! START ──▶ PLAN ──▶ RETRIEVE ──▶ SYNTHESIZE_QUERY ──▶ ANSWER ──▶ DONE
//!             │          │               │                │
//!             └──────────┴───────────────┴────────────────┴──▶ FAILED | TIMEOUT
//! ```
//!
//! Every run owns its [`WorkflowState`]. Components write into the state as
//! they make progress, so a run cut short by the time budget still reports
//! the nodes, paths and hits gathered before the cutoff.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use graphrag_core::{ErrorKind, GraphRagError, Row, Turn, WorkflowStatus};
use graphrag_graph::GraphBackend;
use graphrag_llm::{Embedder, LlmProvider};
use graphrag_session::{new_session_id, InMemorySessionStore, SessionError, SessionStore};
use serde_json::json;
use tokio::time::Instant;

use crate::answer::{AnswerInput, AnswerSynthesizer, NO_DATA_ANSWER};
use crate::config::{Settings, WorkflowConfig};
use crate::index::IndexAccessor;
use crate::refiner::{QueryRefiner, QueryResolution};
use crate::retriever::SubgraphRetriever;
use crate::trace;
use crate::types::{AskRequest, AskResponse, WorkflowReport, WorkflowState};

/// Confidence of a "no matching data" answer.
pub const EMPTY_RESULT_CONFIDENCE: f64 = 0.15;

/// Answers below this confidence should be treated as tentative.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.3;

const BLANK_QUESTION_ANSWER: &str = "Please ask a question.";

/// Named orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowPhase {
    Start,
    Plan,
    Retrieve,
    SynthesizeQuery,
    Answer,
    Done,
    Failed,
    Timeout,
}

/// Forward transitions. FAILED and TIMEOUT are reachable from any
/// non-terminal state.
const TRANSITIONS: &[(WorkflowPhase, WorkflowPhase)] = &[
    (WorkflowPhase::Start, WorkflowPhase::Plan),
    (WorkflowPhase::Plan, WorkflowPhase::Retrieve),
    (WorkflowPhase::Retrieve, WorkflowPhase::SynthesizeQuery),
    (WorkflowPhase::SynthesizeQuery, WorkflowPhase::Answer),
    (WorkflowPhase::Answer, WorkflowPhase::Done),
];

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Plan => "plan",
            Self::Retrieve => "retrieve",
            Self::SynthesizeQuery => "synthesize_query",
            Self::Answer => "answer",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Timeout)
    }

    pub fn can_transition_to(&self, next: WorkflowPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Failed | Self::Timeout) || TRANSITIONS.contains(&(*self, next))
    }
}

/// Ordered action list shown in the response. Explainability only.
pub fn plan_actions(has_history: bool) -> Vec<String> {
    let mut actions = Vec::with_capacity(7);
    if has_history {
        actions.push("use_conversation_history");
    }
    actions.extend([
        "similarity_search",
        "expand_traversal",
        "generate_query",
        "execute_query",
        "refine_if_needed",
        "synthesize_answer",
    ]);
    actions.into_iter().map(String::from).collect()
}

/// Confidence of an answer backed by executed rows.
pub fn answer_confidence(mean_hit_score: f64, refinements: usize, multi_pass: bool, flagged: bool) -> f64 {
    let mut score = 0.6 + 0.2 * mean_hit_score.clamp(0.0, 1.0);
    score -= 0.1 * refinements as f64;
    if multi_pass {
        score += 0.1;
    }
    if flagged {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// What SYNTHESIZE_QUERY handed to ANSWER.
enum Evidence {
    Rows(Vec<Row>),
    NoData,
}

/// Answers questions over the knowledge graph.
pub struct GraphRagEngine {
    index: IndexAccessor,
    retriever: SubgraphRetriever,
    refiner: QueryRefiner,
    answerer: AnswerSynthesizer,
    sessions: Arc<InMemorySessionStore>,
    workflow: WorkflowConfig,
    top_k: usize,
    trace_dir: Option<PathBuf>,
}

impl GraphRagEngine {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        settings: &Settings,
    ) -> Result<Self, GraphRagError> {
        Ok(Self {
            index: IndexAccessor::new(backend.clone(), embedder, &settings.retrieval),
            retriever: SubgraphRetriever::new(backend.clone(), &settings.retrieval),
            refiner: QueryRefiner::new(
                llm.clone(),
                backend,
                &settings.workflow,
                settings.llm.timeout_secs,
            )?,
            answerer: AnswerSynthesizer::new(llm, &settings.answer)?,
            sessions: Arc::new(InMemorySessionStore::new(settings.session.clone())),
            workflow: settings.workflow.clone(),
            top_k: settings.retrieval.top_k,
            trace_dir: settings.trace.dir.clone(),
        })
    }

    /// Share a session store with other engines.
    pub fn with_session_store(mut self, sessions: Arc<InMemorySessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &Arc<InMemorySessionStore> {
        &self.sessions
    }

    /// Most recent turns of a session, oldest first.
    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, SessionError> {
        self.sessions.history(session_id, limit).await
    }

    /// Drop the cached schema snapshot and fetch a fresh one.
    pub async fn refresh_schema(&self) -> Result<(), GraphRagError> {
        self.index.refresh_schema().await.map(|_| ())
    }

    pub async fn ask(&self, request: AskRequest) -> AskResponse {
        self.ask_with_report(request).await.response
    }

    /// Run one question through the workflow.
    ///
    /// Never fails: every outcome, including backend outages and timeouts,
    /// is a well-formed response with a terminal status.
    pub async fn ask_with_report(&self, request: AskRequest) -> WorkflowReport {
        let started = std::time::Instant::now();
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);

        // The budget covers the wait for the session as well as the run.
        let deadline = Instant::now() + Duration::from_secs(self.workflow.time_budget_secs);
        let question = request.question.trim();

        // Held until the turn is appended: same-session runs are serialized.
        let mut lease = if question.is_empty() {
            None
        } else {
            Some(self.bounded(deadline, self.sessions.lease(&session_id)).await)
        };
        let history = match &lease {
            Some(Ok(lease)) => lease.history(self.workflow.history_turns),
            _ => Vec::new(),
        };
        let mut state = WorkflowState::new(session_id, question, history);

        let status = match &lease {
            None => {
                state.answer = BLANK_QUESTION_ANSWER.to_string();
                state.failure_reason = Some("blank question".to_string());
                state.trace.transition("start", "failed", "blank question");
                WorkflowStatus::Failed
            }
            Some(Err(_)) => {
                tracing::warn!(session_id = %state.session_id, "Session busy past the time budget");
                self.terminate(&mut state, WorkflowPhase::Start, self.budget_exceeded());
                WorkflowStatus::Timeout
            }
            Some(Ok(_)) => self.run(&mut state, deadline).await,
        };

        if status == WorkflowStatus::Done {
            if let Some(Ok(lease)) = &mut lease {
                lease.append(Turn::new(&state.question, &state.query, &state.answer));
            }
        }
        drop(lease);

        tracing::info!(
            session_id = %state.session_id,
            status = %status,
            steps = state.steps_taken,
            attempts = state.execution_attempts,
            refinements = state.refinements,
            confidence = state.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Workflow finished"
        );

        let response = state.to_response(status);
        let run_trace = trace::finalize_and_store(state.trace, status, self.trace_dir.as_deref());
        WorkflowReport {
            response,
            failure_reason: state.failure_reason,
            answer_flagged: state.answer_flagged,
            answer_plan_summary: state.answer_plan_summary,
            refinements: state.refinements,
            trace_id: run_trace.id.to_string(),
        }
    }

    async fn run(&self, state: &mut WorkflowState, deadline: Instant) -> WorkflowStatus {
        let mut phase = WorkflowPhase::Start;
        let mut evidence = Evidence::NoData;

        loop {
            let step = match phase {
                WorkflowPhase::Done => return WorkflowStatus::Done,
                WorkflowPhase::Failed => return WorkflowStatus::Failed,
                WorkflowPhase::Timeout => return WorkflowStatus::Timeout,
                _ if Instant::now() >= deadline => Err(self.budget_exceeded()),
                WorkflowPhase::Start => Ok(WorkflowPhase::Plan),
                WorkflowPhase::Plan => self.plan(state),
                WorkflowPhase::Retrieve => self
                    .bounded(deadline, self.retrieve(state))
                    .await
                    .and_then(|r| r)
                    .map(|()| WorkflowPhase::SynthesizeQuery),
                WorkflowPhase::SynthesizeQuery => {
                    match self.bounded(deadline, self.refiner.resolve(state)).await {
                        Ok(QueryResolution::Rows(rows)) => {
                            evidence = Evidence::Rows(rows);
                            Ok(WorkflowPhase::Answer)
                        }
                        Ok(QueryResolution::Empty) => {
                            evidence = Evidence::NoData;
                            Ok(WorkflowPhase::Answer)
                        }
                        Ok(QueryResolution::Failed(e)) | Err(e) => Err(e),
                    }
                }
                WorkflowPhase::Answer => {
                    let evidence = std::mem::replace(&mut evidence, Evidence::NoData);
                    self.bounded(deadline, self.answer(state, evidence))
                        .await
                        .and_then(|r| r)
                        .map(|()| WorkflowPhase::Done)
                }
            };

            phase = match step {
                Ok(next) => self.advance(state, phase, next),
                Err(e) => self.terminate(state, phase, e),
            };
        }
    }

    fn advance(&self, state: &mut WorkflowState, from: WorkflowPhase, to: WorkflowPhase) -> WorkflowPhase {
        debug_assert!(from.can_transition_to(to), "{} -> {}", from.as_str(), to.as_str());
        tracing::debug!(
            session_id = %state.session_id,
            from = from.as_str(),
            to = to.as_str(),
            steps = state.steps_taken,
            "State transition"
        );
        state.trace.transition(from.as_str(), to.as_str(), "");
        to
    }

    /// Record a terminal failure. Backend text stays internal.
    fn terminate(&self, state: &mut WorkflowState, from: WorkflowPhase, err: GraphRagError) -> WorkflowPhase {
        let to = if err.kind() == ErrorKind::WorkflowTimeout {
            WorkflowPhase::Timeout
        } else {
            WorkflowPhase::Failed
        };
        tracing::warn!(
            session_id = %state.session_id,
            state = from.as_str(),
            kind = %err.kind(),
            error = %err,
            "Workflow terminated early"
        );
        state.trace.transition(from.as_str(), to.as_str(), err.kind().as_str());
        state.answer = err.user_message().to_string();
        state.confidence = 0.0;
        state.failure_reason = Some(err.to_string());
        to
    }

    fn budget_exceeded(&self) -> GraphRagError {
        GraphRagError::WorkflowTimeout {
            secs: self.workflow.time_budget_secs,
        }
    }

    /// Drive `fut` until the run's deadline. The future is dropped on expiry;
    /// whatever it already wrote into the state is kept.
    async fn bounded<T>(&self, deadline: Instant, fut: impl Future<Output = T>) -> Result<T, GraphRagError> {
        tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| self.budget_exceeded())
    }

    fn plan(&self, state: &mut WorkflowState) -> Result<WorkflowPhase, GraphRagError> {
        state.take_step(self.workflow.max_steps)?;
        state.plan = plan_actions(!state.history.is_empty());
        trace::record_plan(&mut state.trace, &state.plan);
        Ok(WorkflowPhase::Retrieve)
    }

    async fn retrieve(&self, state: &mut WorkflowState) -> Result<(), GraphRagError> {
        state.take_step(self.workflow.max_steps)?;
        state.schema = Some(self.index.fetch_schema().await?);

        let mut degraded = None;
        match self.index.similarity_search(&state.question, self.top_k).await {
            Ok(hits) => state.similar_nodes = hits,
            Err(e) if e.kind() == ErrorKind::BackendUnavailable => return Err(e),
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "Similarity search failed, continuing without context");
                degraded = Some(e.kind().as_str());
            }
        }

        if !self.retriever.retrieve(&state.similar_nodes, &mut state.subgraph).await {
            degraded = degraded.or(Some("traversal_failed"));
        }
        trace::record_retrieval(&mut state.trace, &state.similar_nodes, &state.subgraph, degraded);
        Ok(())
    }

    async fn answer(&self, state: &mut WorkflowState, evidence: Evidence) -> Result<(), GraphRagError> {
        state.take_step(self.workflow.max_steps)?;

        let rows = match evidence {
            Evidence::Rows(rows) => rows,
            Evidence::NoData => {
                tracing::info!(session_id = %state.session_id, "No matching data after refinement");
                state.answer = NO_DATA_ANSWER.to_string();
                state.confidence = EMPTY_RESULT_CONFIDENCE;
                state.answer_plan_summary = vec!["no_data".to_string()];
                state.trace.event("answer", "no matching data", json!({}), true);
                return Ok(());
            }
        };

        let input = AnswerInput {
            question: &state.question,
            rows: &rows,
            context: &state.subgraph,
            history: &state.history,
        };
        let answer = self.answerer.synthesize(&input).await?;

        state.confidence = answer_confidence(
            state.mean_hit_score(),
            state.refinements,
            answer.multi_pass,
            answer.flagged,
        );
        trace::record_answer(&mut state.trace, &answer, state.confidence);
        state.answer = answer.text;
        state.answer_flagged = answer.flagged;
        state.answer_plan_summary = answer.plan_summary;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_follow_the_table() {
        use WorkflowPhase::*;
        assert!(Start.can_transition_to(Plan));
        assert!(Retrieve.can_transition_to(SynthesizeQuery));
        assert!(!Plan.can_transition_to(Answer));
        assert!(!Answer.can_transition_to(Retrieve));
    }

    #[test]
    fn failure_is_reachable_from_any_live_state() {
        use WorkflowPhase::*;
        for phase in [Start, Plan, Retrieve, SynthesizeQuery, Answer] {
            assert!(phase.can_transition_to(Failed));
            assert!(phase.can_transition_to(Timeout));
        }
        assert!(!Done.can_transition_to(Failed));
        assert!(!Timeout.can_transition_to(Plan));
    }

    #[test]
    fn plan_mentions_history_only_when_present() {
        assert_eq!(plan_actions(false).first().map(String::as_str), Some("similarity_search"));
        assert_eq!(plan_actions(true).first().map(String::as_str), Some("use_conversation_history"));
        assert_eq!(plan_actions(false).last().map(String::as_str), Some("synthesize_answer"));
    }

    #[test]
    fn confidence_rewards_good_hits_and_penalizes_refinement() {
        let clean = answer_confidence(0.9, 0, true, false);
        let refined = answer_confidence(0.9, 2, true, false);
        let flagged = answer_confidence(0.9, 0, true, true);
        assert!(clean > refined);
        assert!(clean > flagged);
        assert!(refined > LOW_CONFIDENCE_THRESHOLD);
        assert!((clean - 0.88).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        assert!((answer_confidence(5.0, 0, true, false) - 0.9).abs() < 1e-9);
        assert_eq!(answer_confidence(0.0, 20, false, true), 0.0);
    }

    #[test]
    fn no_data_confidence_is_low() {
        assert!(EMPTY_RESULT_CONFIDENCE < LOW_CONFIDENCE_THRESHOLD);
    }
}
