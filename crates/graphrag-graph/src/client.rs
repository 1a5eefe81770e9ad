//! Neo4j connection management and shared graph client.

use graphrag_core::GraphRagError;
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::Deserialize;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Statement rejected as invalid: {0}")]
    Syntax(String),

    #[error("Statement failed during execution: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// The database could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Query(e) => matches!(
                e,
                neo4rs::Error::ConnectionError | neo4rs::Error::IOError { .. }
            ),
            _ => false,
        }
    }

    /// The server rejected the statement text itself.
    pub fn is_syntax(&self) -> bool {
        match self {
            Self::Syntax(_) => true,
            Self::Query(e) => {
                let msg = e.to_string();
                msg.contains("SyntaxError") || msg.contains("Invalid input")
            }
            _ => false,
        }
    }

    /// Split a driver error raised by a generated statement into syntax or
    /// execution failures. Transport errors are left as they are.
    pub fn into_statement_error(self) -> Self {
        match self {
            Self::Query(_) if self.is_unavailable() => self,
            Self::Query(_) if self.is_syntax() => Self::Syntax(self.to_string()),
            Self::Query(e) => Self::Execution(e.to_string()),
            other => other,
        }
    }
}

impl From<GraphError> for GraphRagError {
    fn from(err: GraphError) -> Self {
        if err.is_unavailable() {
            return GraphRagError::BackendUnavailable(err.to_string());
        }
        match err {
            GraphError::Syntax(msg) => GraphRagError::QuerySyntax(msg),
            GraphError::Execution(msg) => GraphRagError::QueryExecution(msg),
            GraphError::Serialization(msg) => GraphRagError::Internal(msg),
            other if other.is_syntax() => GraphRagError::QuerySyntax(other.to_string()),
            other => GraphRagError::QueryExecution(other.to_string()),
        }
    }
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from the `[neo4j]` section or `GRAPHRAG__NEO4J__*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Name of the vector index over node embeddings.
    #[serde(default = "default_vector_index")]
    pub vector_index: String,
    /// Node property holding the embedding vector.
    #[serde(default = "default_embedding_property")]
    pub embedding_property: String,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_vector_index() -> String {
    "node_embeddings".to_string()
}

fn default_embedding_property() -> String {
    "embedding".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            vector_index: default_vector_index(),
            embedding_property: default_embedding_property(),
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    vector_index: String,
    embedding_property: String,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self {
            graph,
            vector_index: config.vector_index.clone(),
            embedding_property: config.embedding_property.clone(),
        })
    }

    pub fn vector_index(&self) -> &str {
        &self.vector_index
    }

    pub fn embedding_property(&self) -> &str {
        &self.embedding_property
    }

    /// Execute a query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a query inside an explicit transaction that is always rolled
    /// back, so nothing the statement does is ever committed.
    pub async fn query_rows_uncommitted(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut txn = self.graph.start_txn().await?;
        let mut rows = Vec::new();
        let outcome = match txn.execute(query).await {
            Ok(mut stream) => loop {
                match stream.next(txn.handle()).await {
                    Ok(Some(row)) => rows.push(row),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            },
            Err(e) => Err(e),
        };
        if let Err(e) = txn.rollback().await {
            tracing::warn!(error = %e, "Rollback of read transaction failed");
        }
        outcome?;
        Ok(rows)
    }
}
