//! Core data model shared by the retrieval, query and answer components.
//!
//! These types describe what the workflow reads from the graph (schema,
//! similarity hits, subgraph context) and what it remembers between
//! questions (turns).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result row of a read query, keyed by the RETURN column names.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Properties that exist only to support retrieval and are never shown.
pub const HIDDEN_PROPERTIES: &[&str] = &["embedding", "_text_repr"];

/// Maximum number of properties rendered per node in prompt text.
const MAX_RENDERED_PROPERTIES: usize = 10;

/// Maximum characters of a single property value rendered in prompt text.
const MAX_RENDERED_VALUE_CHARS: usize = 100;

// ── Schema ────────────────────────────────────────────────────────

/// Read-only snapshot of the graph schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSchema {
    /// Node labels present in the graph.
    pub labels: BTreeSet<String>,
    /// Relationship types present in the graph.
    pub relationship_types: BTreeSet<String>,
    /// Property names observed per label.
    pub properties: BTreeMap<String, BTreeSet<String>>,
}

impl GraphSchema {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn has_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship_types.contains(rel_type)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.relationship_types.is_empty()
    }

    /// Render the schema as compact text for a generation prompt.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for label in &self.labels {
            let props = self
                .properties
                .get(label)
                .map(|p| {
                    p.iter()
                        .filter(|name| !HIDDEN_PROPERTIES.contains(&name.as_str()))
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            if props.is_empty() {
                let _ = writeln!(out, "- {label} nodes");
            } else {
                let _ = writeln!(out, "- {label} nodes with properties: {props}");
            }
        }
        if !self.relationship_types.is_empty() {
            let types = self
                .relationship_types
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "- Relationships: {types}");
        }
        out
    }
}

// ── Retrieval ─────────────────────────────────────────────────────

/// A node matched by the embedding index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: String,
    pub label: String,
    /// Similarity in `[0.0, 1.0]`; higher is closer.
    pub score: f64,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// A node included in the subgraph context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut properties = properties;
        strip_hidden(&mut properties);
        Self {
            id: id.into(),
            label: label.into(),
            properties,
        }
    }

    /// Text representation used when the node is shown to a model.
    pub fn text_repr(&self) -> String {
        node_text_repr(&self.label, &self.properties)
    }
}

impl From<&SimilarityHit> for GraphNode {
    fn from(hit: &SimilarityHit) -> Self {
        GraphNode::new(hit.id.clone(), hit.label.clone(), hit.properties.clone())
    }
}

/// A directed relationship included in the subgraph context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub start: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub end: String,
}

/// Bounded evidence subgraph retrieved for a question.
///
/// Nodes and relationships keep their insertion order, which is the
/// retrieval priority order (hit rank, then discovery order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubgraphContext {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

impl SubgraphContext {
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn contains_relationship(&self, rel: &GraphRelationship) -> bool {
        self.relationships.iter().any(|r| r == rel)
    }

    /// Add a node unless it is already present or `cap` is reached.
    ///
    /// Returns `true` if the node is present after the call.
    pub fn add_node(&mut self, node: GraphNode, cap: usize) -> bool {
        if self.contains_node(&node.id) {
            return true;
        }
        if self.nodes.len() >= cap {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Add a relationship if both endpoints are present, it is new, and
    /// `cap` is not reached.
    pub fn add_relationship(&mut self, rel: GraphRelationship, cap: usize) -> bool {
        if self.relationships.len() >= cap || self.contains_relationship(&rel) {
            return false;
        }
        if !self.contains_node(&rel.start) || !self.contains_node(&rel.end) {
            return false;
        }
        self.relationships.push(rel);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.relationships.clear();
    }

    /// Serialize the context as text for inclusion in a prompt.
    pub fn to_prompt_text(&self) -> String {
        if self.is_empty() {
            return "(no supporting context retrieved)".to_string();
        }

        let mut out = String::from("Entities:\n");
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "- [{}] {}",
                node.id,
                node.text_repr().replace('\n', "; ")
            );
        }
        if !self.relationships.is_empty() {
            out.push_str("Connections:\n");
            for rel in &self.relationships {
                let _ = writeln!(out, "- ({})-[:{}]->({})", rel.start, rel.rel_type, rel.end);
            }
        }
        out
    }
}

// ── Conversation ──────────────────────────────────────────────────

/// One question/answer exchange stored under a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub query: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        question: impl Into<String>,
        query: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            query: query.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }
}

// ── Workflow ──────────────────────────────────────────────────────

/// Terminal status class of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Done,
    Failed,
    Timeout,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────

/// Remove retrieval-only properties from a property map.
pub fn strip_hidden(properties: &mut serde_json::Map<String, serde_json::Value>) {
    for key in HIDDEN_PROPERTIES {
        properties.remove(*key);
    }
}

/// `Label: X` followed by up to ten `key: value` lines, values truncated.
pub fn node_text_repr(
    label: &str,
    properties: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut parts = Vec::new();
    if !label.is_empty() {
        parts.push(format!("Label: {label}"));
    }
    for (key, value) in properties
        .iter()
        .filter(|(k, v)| !HIDDEN_PROPERTIES.contains(&k.as_str()) && !v.is_null())
        .take(MAX_RENDERED_PROPERTIES)
    {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let truncated: String = rendered.chars().take(MAX_RENDERED_VALUE_CHARS).collect();
        parts.push(format!("{key}: {truncated}"));
    }
    if parts.is_empty() {
        "(empty)".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn node_drops_hidden_properties() {
        let node = GraphNode::new(
            "4:abc:1",
            "Patient",
            props(json!({"firstName": "Ana", "embedding": [0.1, 0.2], "_text_repr": "x"})),
        );
        assert_eq!(node.properties.len(), 1);
        assert!(node.properties.contains_key("firstName"));
    }

    #[test]
    fn text_repr_truncates_long_values() {
        let long = "x".repeat(300);
        let text = node_text_repr("Condition", &props(json!({ "description": long })));
        let line = text.lines().nth(1).unwrap();
        assert_eq!(line.len(), "description: ".len() + 100);
    }

    #[test]
    fn text_repr_of_empty_node() {
        assert_eq!(node_text_repr("", &serde_json::Map::new()), "(empty)");
    }

    #[test]
    fn subgraph_enforces_caps_and_dedup() {
        let mut ctx = SubgraphContext::default();
        assert!(ctx.add_node(GraphNode::new("a", "X", Default::default()), 2));
        assert!(ctx.add_node(GraphNode::new("a", "X", Default::default()), 2));
        assert!(ctx.add_node(GraphNode::new("b", "X", Default::default()), 2));
        assert!(!ctx.add_node(GraphNode::new("c", "X", Default::default()), 2));
        assert_eq!(ctx.nodes.len(), 2);

        let rel = GraphRelationship {
            start: "a".into(),
            rel_type: "R".into(),
            end: "b".into(),
        };
        assert!(ctx.add_relationship(rel.clone(), 1));
        assert!(!ctx.add_relationship(rel, 1));

        let dangling = GraphRelationship {
            start: "a".into(),
            rel_type: "R".into(),
            end: "c".into(),
        };
        assert!(!ctx.add_relationship(dangling, 10));
        assert_eq!(ctx.relationships.len(), 1);
    }

    #[test]
    fn schema_prompt_lists_labels_and_types() {
        let mut schema = GraphSchema::default();
        schema.labels.insert("Patient".into());
        schema.relationship_types.insert("HAS_CONDITION".into());
        schema
            .properties
            .entry("Patient".into())
            .or_default()
            .extend(["id".to_string(), "embedding".to_string()]);

        let text = schema.to_prompt_text();
        assert!(text.contains("- Patient nodes with properties: id"));
        assert!(!text.contains("embedding"));
        assert!(text.contains("Relationships: HAS_CONDITION"));
    }

    #[test]
    fn relationship_serializes_type_field() {
        let rel = GraphRelationship {
            start: "1".into(),
            rel_type: "UNDERWENT".into(),
            end: "2".into(),
        };
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value, json!({"start": "1", "type": "UNDERWENT", "end": "2"}));
    }
}
