//! Read operations against the knowledge graph.

use graphrag_core::types::strip_hidden;
use graphrag_core::{GraphNode, GraphRelationship, GraphSchema, Row, SimilarityHit};
use neo4rs::query;

use crate::backend::Neighbor;
use crate::client::{GraphClient, GraphError};

/// Number of embedded nodes ranked in process when the vector index is unusable.
const SCAN_CANDIDATE_LIMIT: i64 = 100;

type PropertyMap = serde_json::Map<String, serde_json::Value>;

impl GraphClient {
    // ── Schema ───────────────────────────────────────────────────

    /// Introspect labels, relationship types and property names.
    pub async fn fetch_schema(&self) -> Result<GraphSchema, GraphError> {
        let mut schema = GraphSchema::default();

        for row in self
            .query_rows(query("CALL db.labels() YIELD label RETURN label"))
            .await?
        {
            if let Ok(label) = row.get::<String>("label") {
                schema.labels.insert(label);
            }
        }

        for row in self
            .query_rows(query(
                "CALL db.relationshipTypes() YIELD relationshipType
                 RETURN relationshipType",
            ))
            .await?
        {
            if let Ok(rel_type) = row.get::<String>("relationshipType") {
                schema.relationship_types.insert(rel_type);
            }
        }

        let rows = self
            .query_rows(query(
                "CALL db.schema.nodeTypeProperties() YIELD nodeLabels, propertyName
                 RETURN nodeLabels, propertyName",
            ))
            .await?;
        for row in rows {
            let labels: Vec<String> = row.get("nodeLabels").unwrap_or_default();
            let Ok(Some(property)) = row.get::<Option<String>>("propertyName") else {
                continue;
            };
            for label in labels {
                schema
                    .properties
                    .entry(label)
                    .or_default()
                    .insert(property.clone());
            }
        }

        tracing::debug!(
            labels = schema.labels.len(),
            relationship_types = schema.relationship_types.len(),
            "Fetched graph schema"
        );
        Ok(schema)
    }

    // ── Similarity ───────────────────────────────────────────────

    /// Nearest neighbors through the native vector index.
    pub async fn index_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit>, GraphError> {
        let q = query(
            "CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score
             RETURN elementId(node) AS id, labels(node)[0] AS label,
                    score, properties(node) AS properties
             ORDER BY score DESC
             LIMIT $k",
        )
        .param("index", self.vector_index().to_string())
        .param("k", k as i64)
        .param("embedding", to_f64(embedding));

        let rows = self.query_rows(q).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            hits.push(SimilarityHit {
                id: row.get::<String>("id").unwrap_or_default(),
                label: row.get::<String>("label").unwrap_or_default(),
                score: row.get::<f64>("score").unwrap_or(0.0),
                properties: visible_properties(&row, "properties"),
            });
        }
        Ok(hits)
    }

    /// Rank embedded nodes by cosine similarity in process.
    ///
    /// Scores are mapped to `[0, 1]` as `(1 + cos) / 2`, matching the
    /// normalization the native cosine index applies.
    pub async fn scan_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit>, GraphError> {
        let q = query(
            "MATCH (n) WHERE n[$prop] IS NOT NULL
             RETURN elementId(n) AS id, labels(n)[0] AS label,
                    n[$prop] AS embedding, properties(n) AS properties
             LIMIT $limit",
        )
        .param("prop", self.embedding_property().to_string())
        .param("limit", SCAN_CANDIDATE_LIMIT);

        let rows = self.query_rows(q).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let Ok(candidate) = row.get::<Vec<f64>>("embedding") else {
                continue;
            };
            let Some(cos) = cosine_similarity(embedding, &candidate) else {
                continue;
            };
            hits.push(SimilarityHit {
                id: row.get::<String>("id").unwrap_or_default(),
                label: row.get::<String>("label").unwrap_or_default(),
                score: (1.0 + cos) / 2.0,
                properties: visible_properties(&row, "properties"),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    // ── Traversal ────────────────────────────────────────────────

    /// Direct relationships of a node in either direction.
    ///
    /// Ordered by relationship type then neighbor id so expansion is stable.
    pub async fn neighbors(&self, node_id: &str, limit: usize) -> Result<Vec<Neighbor>, GraphError> {
        let q = query(
            "MATCH (a)-[r]-(b)
             WHERE elementId(a) = $id
             RETURN elementId(startNode(r)) AS start, type(r) AS rel_type,
                    elementId(endNode(r)) AS end, elementId(b) AS id,
                    labels(b)[0] AS label, properties(b) AS properties
             ORDER BY rel_type, id
             LIMIT $limit",
        )
        .param("id", node_id.to_string())
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id").map_err(|e| {
                GraphError::Serialization(format!("Failed to read neighbor id: {e}"))
            })?;
            let label: String = row.get("label").unwrap_or_default();
            let node = GraphNode::new(id, label, visible_properties(&row, "properties"));

            let relationship = GraphRelationship {
                start: row.get::<String>("start").unwrap_or_default(),
                rel_type: row.get::<String>("rel_type").unwrap_or_default(),
                end: row.get::<String>("end").unwrap_or_default(),
            };
            results.push(Neighbor { node, relationship });
        }
        Ok(results)
    }

    // ── Statement Execution ──────────────────────────────────────

    /// Execute a generated statement and convert every row to JSON.
    ///
    /// Runs in a rolled-back transaction: even a statement that slipped past
    /// validation cannot persist a write.
    pub async fn execute_read(&self, statement: &str) -> Result<Vec<Row>, GraphError> {
        let rows = self
            .query_rows_uncommitted(query(statement))
            .await
            .map_err(GraphError::into_statement_error)?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record: Row = row.to().map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize row: {e}"))
            })?;
            for value in record.values_mut() {
                if let serde_json::Value::Object(map) = value {
                    strip_hidden(map);
                }
            }
            results.push(record);
        }
        Ok(results)
    }
}

/// Read a property map column, dropping retrieval-only keys.
fn visible_properties(row: &neo4rs::Row, column: &str) -> PropertyMap {
    let mut props: PropertyMap = row.get(column).unwrap_or_default();
    strip_hidden(&mut props);
    props
}

fn to_f64(values: &[f32]) -> Vec<f64> {
    values.iter().map(|v| *v as f64).collect()
}

/// Cosine similarity in `[-1, 1]`, or `None` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * y).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|y| y.powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn cosine_rejects_mismatched_or_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }
}
