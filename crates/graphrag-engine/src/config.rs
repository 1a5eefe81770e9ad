//! Configuration for the question-answering engine.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GRAPHRAG__SECTION__KEY`)
//! 2. Config file (`graphrag.toml` by default)
//! 3. Defaults
//!
//! Every section has serde defaults, so an empty configuration is valid.

use std::path::PathBuf;

use graphrag_core::GraphRagError;
use graphrag_graph::GraphConfig;
use graphrag_llm::{EmbeddingConfig, LlmConfig};
use graphrag_session::SessionConfig;
use serde::Deserialize;

/// All engine settings, one field per config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: GraphConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Similarity search and subgraph expansion limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Number of similarity hits kept.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring below this are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Traversal depth from each hit.
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_relationships")]
    pub max_relationships: usize,
    /// Neighbors fetched per expanded node.
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,
    /// Age after which the cached schema is re-fetched.
    #[serde(default = "default_schema_ttl_secs")]
    pub schema_ttl_secs: u64,
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f64 {
    0.5
}

fn default_depth() -> usize {
    1
}

fn default_max_nodes() -> usize {
    20
}

fn default_max_relationships() -> usize {
    30
}

fn default_neighbor_limit() -> usize {
    25
}

fn default_schema_ttl_secs() -> u64 {
    300
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            depth: default_depth(),
            max_nodes: default_max_nodes(),
            max_relationships: default_max_relationships(),
            neighbor_limit: default_neighbor_limit(),
            schema_ttl_secs: default_schema_ttl_secs(),
        }
    }
}

/// Step, refinement and time budgets of a workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on planning, retrieval, execution attempts and answering combined.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Shared budget for repair and broadening refinements.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: usize,
    /// How many of the refinements may broaden an empty result.
    #[serde(default = "default_max_broadenings")]
    pub max_broadenings: usize,
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    /// Number of previous turns given to query generation and answering.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_max_steps() -> usize {
    6
}

fn default_max_refinements() -> usize {
    2
}

fn default_max_broadenings() -> usize {
    1
}

fn default_time_budget_secs() -> u64 {
    60
}

fn default_history_turns() -> usize {
    5
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_refinements: default_max_refinements(),
            max_broadenings: default_max_broadenings(),
            time_budget_secs: default_time_budget_secs(),
            history_turns: default_history_turns(),
        }
    }
}

/// Answer synthesis behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerConfig {
    /// Run the plan/analyze/critique/improve pipeline before falling back.
    #[serde(default = "default_multi_pass")]
    pub multi_pass: bool,
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
    /// Terms that must not appear in an answer (whole words, any case).
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    #[serde(default = "default_max_rows_in_prompt")]
    pub max_rows_in_prompt: usize,
}

fn default_multi_pass() -> bool {
    true
}

fn default_pipeline_timeout_secs() -> u64 {
    30
}

pub fn default_denylist() -> Vec<String> {
    [
        "cypher",
        "query",
        "queries",
        "database",
        "graph",
        "node",
        "nodes",
        "relationship",
        "relationships",
        "neo4j",
        "schema",
        "embedding",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_rows_in_prompt() -> usize {
    50
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            multi_pass: default_multi_pass(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            denylist: default_denylist(),
            max_rows_in_prompt: default_max_rows_in_prompt(),
        }
    }
}

/// Run trace persistence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceConfig {
    /// When set, every run's trace is written under this directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Load settings from `{file_prefix}.toml` (optional) and `GRAPHRAG__*` variables.
pub fn load_settings(file_prefix: &str) -> Result<Settings, GraphRagError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("GRAPHRAG")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize::<Settings>())
        .map_err(|e| GraphRagError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let settings = load_settings(prefix.to_str().unwrap()).unwrap();

        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.retrieval.max_nodes, 20);
        assert_eq!(settings.workflow.max_refinements, 2);
        assert_eq!(settings.workflow.max_steps, 6);
        assert_eq!(settings.neo4j.uri, "bolt://localhost:7687");
        assert!(settings.answer.multi_pass);
        assert!(settings.trace.dir.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphrag.toml");
        std::fs::write(
            &path,
            r#"
[retrieval]
top_k = 8
depth = 2

[workflow]
time_budget_secs = 15

[answer]
denylist = ["cypher"]
"#,
        )
        .unwrap();

        let prefix = dir.path().join("graphrag");
        let settings = load_settings(prefix.to_str().unwrap()).unwrap();
        assert_eq!(settings.retrieval.top_k, 8);
        assert_eq!(settings.retrieval.depth, 2);
        assert_eq!(settings.retrieval.min_score, 0.5);
        assert_eq!(settings.workflow.time_budget_secs, 15);
        assert_eq!(settings.answer.denylist, vec!["cypher".to_string()]);
    }
}
