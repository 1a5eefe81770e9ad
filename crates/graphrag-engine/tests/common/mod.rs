//! In-memory fakes of the graph, generation and embedding providers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use graphrag_core::{GraphNode, GraphRelationship, GraphSchema, Row, SimilarityHit};
use graphrag_engine::{prompts, GraphRagEngine, Settings};
use graphrag_graph::{GraphBackend, GraphError, Neighbor};
use graphrag_llm::{Embedder, LlmError, LlmProvider, Message, Role};
use serde_json::json;

pub const GOOD_STATEMENT: &str = "MATCH (p:Patient)-[:HAS_CONDITION]->(c:Condition) \
     WHERE toLower(c.description) CONTAINS 'diabetes' RETURN p.id AS patient";

pub const PLAIN_ANSWER: &str = "Patient P1 has diabetes.";

/// Scripted result of one statement execution.
#[derive(Debug, Clone)]
pub enum Exec {
    Rows(Vec<Row>),
    Syntax(&'static str),
    Unavailable,
}

impl Exec {
    pub fn empty() -> Self {
        Exec::Rows(Vec::new())
    }

    fn into_result(self) -> Result<Vec<Row>, GraphError> {
        match self {
            Exec::Rows(rows) => Ok(rows),
            Exec::Syntax(msg) => Err(GraphError::Syntax(msg.to_string())),
            Exec::Unavailable => Err(GraphError::Connection("connection refused".into())),
        }
    }
}

pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("row must be an object, got {other}"),
    }
}

pub fn patient_rows() -> Vec<Row> {
    vec![row(json!({ "patient": "P1" }))]
}

/// Pop the next scripted item, repeating the last one forever.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ── Graph ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockGraph {
    pub schema: GraphSchema,
    pub schema_unavailable: bool,
    pub hits: Vec<SimilarityHit>,
    pub neighbors: HashMap<String, Vec<Neighbor>>,
    pub neighbor_delay: Option<Duration>,
    pub neighbor_failure: bool,
    results: Mutex<VecDeque<Exec>>,
    executed: Mutex<Vec<String>>,
}

impl MockGraph {
    /// Patients and conditions, with P1 having diabetes.
    pub fn clinical() -> Self {
        let mut schema = GraphSchema::default();
        schema.labels.insert("Patient".into());
        schema.labels.insert("Condition".into());
        schema.relationship_types.insert("HAS_CONDITION".into());
        schema
            .properties
            .insert("Patient".into(), ["id".to_string(), "name".to_string()].into());
        schema
            .properties
            .insert("Condition".into(), ["description".to_string()].into());

        let hits = vec![
            hit("c1", "Condition", 0.92, json!({ "description": "Diabetes" })),
            hit("p1", "Patient", 0.81, json!({ "id": "P1", "name": "Ann" })),
        ];

        let mut neighbors = HashMap::new();
        neighbors.insert(
            "c1".to_string(),
            vec![neighbor("p1", "Patient", json!({ "id": "P1" }), rel("p1", "HAS_CONDITION", "c1"))],
        );
        neighbors.insert(
            "p1".to_string(),
            vec![neighbor(
                "c1",
                "Condition",
                json!({ "description": "Diabetes" }),
                rel("p1", "HAS_CONDITION", "c1"),
            )],
        );

        let graph = Self {
            schema,
            hits,
            neighbors,
            ..Default::default()
        };
        graph.script(vec![Exec::Rows(patient_rows())])
    }

    pub fn script(self, results: Vec<Exec>) -> Self {
        *self.results.lock().unwrap() = results.into();
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

pub fn hit(id: &str, label: &str, score: f64, props: serde_json::Value) -> SimilarityHit {
    SimilarityHit {
        id: id.into(),
        label: label.into(),
        score,
        properties: row(props),
    }
}

pub fn rel(start: &str, rel_type: &str, end: &str) -> GraphRelationship {
    GraphRelationship {
        start: start.into(),
        rel_type: rel_type.into(),
        end: end.into(),
    }
}

pub fn neighbor(id: &str, label: &str, props: serde_json::Value, relationship: GraphRelationship) -> Neighbor {
    Neighbor {
        node: GraphNode::new(id, label, row(props)),
        relationship,
    }
}

#[async_trait]
impl GraphBackend for MockGraph {
    async fn fetch_schema(&self) -> Result<GraphSchema, GraphError> {
        if self.schema_unavailable {
            return Err(GraphError::Connection("connection refused".into()));
        }
        Ok(self.schema.clone())
    }

    /// Best `k` hits, highest score first.
    async fn vector_search(&self, _embedding: &[f32], k: usize) -> Result<Vec<SimilarityHit>, GraphError> {
        let mut hits = self.hits.clone();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn neighbors(&self, node_id: &str, limit: usize) -> Result<Vec<Neighbor>, GraphError> {
        if let Some(delay) = self.neighbor_delay {
            tokio::time::sleep(delay).await;
        }
        if self.neighbor_failure {
            return Err(GraphError::Execution("traversal failed".into()));
        }
        Ok(self
            .neighbors
            .get(node_id)
            .map(|n| n.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn execute_read(&self, statement: &str) -> Result<Vec<Row>, GraphError> {
        self.executed.lock().unwrap().push(statement.to_string());
        let mut results = self.results.lock().unwrap();
        next_scripted(&mut *results).unwrap_or_else(Exec::empty).into_result()
    }
}

// ── Embedding ─────────────────────────────────────────────────────

pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.1; 8])
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Status {
            status: 503,
            body: "embedding service overloaded".into(),
        })
    }
}

// ── Generation ────────────────────────────────────────────────────

/// Replies chosen by the system instruction of each call.
pub struct ScriptedLlm {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    /// Generates [`GOOD_STATEMENT`] and answers with [`PLAIN_ANSWER`].
    pub fn new() -> Self {
        let llm = Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        };
        llm.reply(prompts::QUERY_GENERATION, vec![GOOD_STATEMENT])
            .reply(prompts::QUERY_REPAIR, vec![GOOD_STATEMENT])
            .reply(prompts::QUERY_BROADEN, vec![GOOD_STATEMENT])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(self, system: &str, replies: Vec<&str>) -> Self {
        let queue = replies.into_iter().map(|r| Ok(r.to_string())).collect();
        self.scripts.lock().unwrap().insert(system.to_string(), queue);
        self
    }

    pub fn fail(self, system: &str) -> Self {
        let queue = VecDeque::from([Err("provider error".to_string())]);
        self.scripts.lock().unwrap().insert(system.to_string(), queue);
        self
    }

    /// Number of calls made with `system` as the instruction.
    pub fn calls_to(&self, system: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(s, _)| s == system).count()
    }

    /// User prompts sent with `system`, in call order.
    pub fn prompts_for(&self, system: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == system)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let text_of = |role: Role| {
            messages
                .iter()
                .find(|m| m.role == role)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        };
        let system = text_of(Role::System);
        let prompt = text_of(Role::User);
        self.calls.lock().unwrap().push((system.clone(), prompt));

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&system).and_then(|queue| next_scripted(queue))
        };
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(LlmError::Response(msg)),
            None => Ok(PLAIN_ANSWER.to_string()),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

// ── Engine ────────────────────────────────────────────────────────

pub fn settings() -> Settings {
    Settings::default()
}

pub fn engine(graph: Arc<MockGraph>, llm: Arc<ScriptedLlm>) -> GraphRagEngine {
    engine_with(graph, llm, Arc::new(FixedEmbedder), &settings())
}

pub fn engine_with(
    graph: Arc<MockGraph>,
    llm: Arc<ScriptedLlm>,
    embedder: Arc<dyn Embedder>,
    settings: &Settings,
) -> GraphRagEngine {
    GraphRagEngine::new(graph, llm, embedder, settings).unwrap()
}
