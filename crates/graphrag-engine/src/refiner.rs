//! Query synthesis and bounded refinement.
//!
//! ```text
//! GENERATE ──▶ EXECUTE ──▶ DONE
//!    ▲            │
//!    │            ├──▶ REFINE ──▶ GENERATE   (repair or broaden)
//!    │            │
//!    └────────────┴──▶ FAILED                (budget exhausted or fatal)
//! ```
//!
//! The policy deciding what happens after an execution is a pure function
//! of the outcome and the counters, see [`RefinementPolicy::decide`].

use std::sync::Arc;

use graphrag_core::{GraphRagError, GraphSchema, Row};
use graphrag_graph::GraphBackend;
use graphrag_llm::{LlmError, LlmProvider};
use graphrag_session::format_history;
use serde_json::json;

use crate::config::WorkflowConfig;
use crate::cypher::{self, PromptContext, StatementValidator};
use crate::prompts;
use crate::types::WorkflowState;

/// How a failed execution is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineStrategy {
    /// Feed the failure and the statement back to fix it.
    Repair,
    /// Relax the statement after it matched nothing.
    Broaden,
}

impl RefineStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repair => "repair",
            Self::Broaden => "broaden",
        }
    }
}

/// Outcome of one execution attempt (validation included).
#[derive(Debug)]
pub enum ExecutionOutcome {
    Rows(Vec<Row>),
    Empty,
    Error(GraphRagError),
}

/// What the refiner does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Done,
    Refine(RefineStrategy),
    /// Budget used up: empty stays empty, errors become FAILED.
    Exhausted,
    /// The error has no refinement path.
    Abort,
}

/// Deterministic retry policy.
///
/// Empty results and refinable errors share one budget of
/// `max_refinements`; at most `max_broadenings` of those may broaden.
#[derive(Debug, Clone, Copy)]
pub struct RefinementPolicy {
    pub max_refinements: usize,
    pub max_broadenings: usize,
}

impl RefinementPolicy {
    pub fn decide(&self, outcome: &ExecutionOutcome, refinements: usize, broadenings: usize) -> Decision {
        let budget_left = refinements < self.max_refinements;
        match outcome {
            ExecutionOutcome::Rows(_) => Decision::Done,
            ExecutionOutcome::Empty if budget_left && broadenings < self.max_broadenings => {
                Decision::Refine(RefineStrategy::Broaden)
            }
            ExecutionOutcome::Empty => Decision::Exhausted,
            ExecutionOutcome::Error(e) if !e.is_refinable() => Decision::Abort,
            ExecutionOutcome::Error(_) if budget_left => Decision::Refine(RefineStrategy::Repair),
            ExecutionOutcome::Error(_) => Decision::Exhausted,
        }
    }
}

/// Terminal result of the query loop.
#[derive(Debug)]
pub enum QueryResolution {
    Rows(Vec<Row>),
    /// Nothing matched, even after broadening.
    Empty,
    Failed(GraphRagError),
}

enum Phase {
    Generate(Option<(RefineStrategy, String)>),
    Execute,
    Refine(RefineStrategy, String),
}

/// Runs the GENERATE / EXECUTE / REFINE loop for one question.
pub struct QueryRefiner {
    llm: Arc<dyn LlmProvider>,
    backend: Arc<dyn GraphBackend>,
    validator: StatementValidator,
    policy: RefinementPolicy,
    max_steps: usize,
    generation_timeout_secs: u64,
}

impl QueryRefiner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        backend: Arc<dyn GraphBackend>,
        config: &WorkflowConfig,
        generation_timeout_secs: u64,
    ) -> Result<Self, GraphRagError> {
        Ok(Self {
            llm,
            backend,
            validator: StatementValidator::new()?,
            policy: RefinementPolicy {
                max_refinements: config.max_refinements,
                max_broadenings: config.max_broadenings,
            },
            max_steps: config.max_steps,
            generation_timeout_secs,
        })
    }

    /// Produce and execute a statement, refining within budget.
    ///
    /// Progress (current statement, attempts, refinements, steps) is written
    /// into `state` as it happens.
    pub async fn resolve(&self, state: &mut WorkflowState) -> QueryResolution {
        let schema = state.schema.clone().unwrap_or_default();
        let context_text = state.subgraph.to_prompt_text();
        let history_text = format_history(&state.history);
        let question = state.question.clone();
        let prompt_ctx = PromptContext {
            question: &question,
            schema: &schema,
            context: &context_text,
            history: &history_text,
        };

        let mut phase = Phase::Generate(None);
        loop {
            phase = match phase {
                Phase::Generate(retry) => {
                    let (system, prompt) = match &retry {
                        None => (prompts::QUERY_GENERATION, cypher::generation_prompt(&prompt_ctx)),
                        Some((RefineStrategy::Repair, reason)) => (
                            prompts::QUERY_REPAIR,
                            cypher::repair_prompt(&prompt_ctx, &state.query, reason),
                        ),
                        Some((RefineStrategy::Broaden, _)) => (
                            prompts::QUERY_BROADEN,
                            cypher::broaden_prompt(&prompt_ctx, &state.query),
                        ),
                    };
                    match self.llm.generate(system, &prompt).await {
                        Ok(raw) => {
                            state.query = cypher::clean_statement(&raw);
                            tracing::debug!(statement = %state.query, "Statement generated");
                            Phase::Execute
                        }
                        Err(e) => {
                            let err = self.generation_error(e);
                            state.trace.event("generate", &err.to_string(), json!({}), false);
                            return self.fail(state, err);
                        }
                    }
                }
                Phase::Execute => {
                    if let Err(e) = state.take_step(self.max_steps) {
                        return self.fail(state, e);
                    }
                    state.execution_attempts += 1;
                    let outcome = self.execute(&state.query, &schema).await;
                    self.record_attempt(state, &outcome);

                    match self.policy.decide(&outcome, state.refinements, state.broadenings) {
                        Decision::Done | Decision::Exhausted | Decision::Abort => {
                            return match outcome {
                                ExecutionOutcome::Rows(rows) => QueryResolution::Rows(rows),
                                ExecutionOutcome::Empty => QueryResolution::Empty,
                                ExecutionOutcome::Error(e) => self.fail(state, e),
                            };
                        }
                        Decision::Refine(strategy) => {
                            let reason = match outcome {
                                ExecutionOutcome::Error(e) => e.to_string(),
                                _ => "the statement returned no rows".to_string(),
                            };
                            Phase::Refine(strategy, reason)
                        }
                    }
                }
                Phase::Refine(strategy, reason) => {
                    state.refinements += 1;
                    if strategy == RefineStrategy::Broaden {
                        state.broadenings += 1;
                    }
                    tracing::info!(
                        strategy = strategy.as_str(),
                        refinement = state.refinements,
                        reason = %reason,
                        "Refining statement"
                    );
                    state.trace.transition("execute", "refine", strategy.as_str());
                    state.trace.transition("refine", "generate", "");
                    Phase::Generate(Some((strategy, reason)))
                }
            };
        }
    }

    async fn execute(&self, statement: &str, schema: &GraphSchema) -> ExecutionOutcome {
        if let Err(e) = self.validator.validate(statement, schema) {
            tracing::warn!(kind = %e.kind(), error = %e, "Statement rejected before execution");
            return ExecutionOutcome::Error(e);
        }
        match self.backend.execute_read(statement).await {
            Ok(rows) if rows.is_empty() => ExecutionOutcome::Empty,
            Ok(rows) => ExecutionOutcome::Rows(rows),
            Err(e) => ExecutionOutcome::Error(GraphRagError::from(e)),
        }
    }

    fn record_attempt(&self, state: &mut WorkflowState, outcome: &ExecutionOutcome) {
        let attempt = state.execution_attempts;
        let (description, success, mut details) = match outcome {
            ExecutionOutcome::Rows(rows) => (
                format!("attempt {attempt}: {} rows", rows.len()),
                true,
                json!({ "rows": rows.len() }),
            ),
            ExecutionOutcome::Empty => (format!("attempt {attempt}: no rows"), true, json!({ "rows": 0 })),
            ExecutionOutcome::Error(e) => (
                format!("attempt {attempt}: {}", e.kind()),
                false,
                json!({ "error": e.to_string() }),
            ),
        };
        details["statement"] = json!(state.query);
        state.trace.event("execute", &description, details, success);
        tracing::debug!(attempt, success, "{description}");
    }

    fn generation_error(&self, err: LlmError) -> GraphRagError {
        match err {
            LlmError::Timeout => GraphRagError::GenerationTimeout {
                secs: self.generation_timeout_secs,
            },
            other => GraphRagError::Generation(other.to_string()),
        }
    }

    fn fail(&self, state: &mut WorkflowState, err: GraphRagError) -> QueryResolution {
        tracing::warn!(
            kind = %err.kind(),
            attempts = state.execution_attempts,
            refinements = state.refinements,
            "Query synthesis failed"
        );
        state.failure_reason = Some(err.to_string());
        QueryResolution::Failed(err)
    }
}
