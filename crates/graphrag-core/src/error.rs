use thiserror::Error;

/// Error taxonomy for the question-answering workflow.
#[derive(Error, Debug)]
pub enum GraphRagError {
    #[error("Graph backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Query returned no rows")]
    EmptyResult,

    #[error("Statement rejected: {0}")]
    UnsafeStatement(String),

    #[error("Statement references unknown schema elements: {0}")]
    SchemaViolation(String),

    #[error("Generation timed out after {secs}s")]
    GenerationTimeout { secs: u64 },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Workflow exceeded its {secs}s budget")]
    WorkflowTimeout { secs: u64 },

    #[error("Answer failed validation: {0}")]
    AnswerValidation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, loggable classification of a [`GraphRagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackendUnavailable,
    EmbeddingService,
    QuerySyntax,
    QueryExecution,
    EmptyResult,
    UnsafeStatement,
    SchemaViolation,
    GenerationTimeout,
    Generation,
    WorkflowTimeout,
    AnswerValidation,
    Config,
    Serialization,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendUnavailable => "backend_unavailable",
            Self::EmbeddingService => "embedding_service",
            Self::QuerySyntax => "query_syntax",
            Self::QueryExecution => "query_execution",
            Self::EmptyResult => "empty_result",
            Self::UnsafeStatement => "unsafe_statement",
            Self::SchemaViolation => "schema_violation",
            Self::GenerationTimeout => "generation_timeout",
            Self::Generation => "generation",
            Self::WorkflowTimeout => "workflow_timeout",
            Self::AnswerValidation => "answer_validation",
            Self::Config => "config",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GraphRagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::EmbeddingService(_) => ErrorKind::EmbeddingService,
            Self::QuerySyntax(_) => ErrorKind::QuerySyntax,
            Self::QueryExecution(_) => ErrorKind::QueryExecution,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::UnsafeStatement(_) => ErrorKind::UnsafeStatement,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Self::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            Self::Generation(_) => ErrorKind::Generation,
            Self::WorkflowTimeout { .. } => ErrorKind::WorkflowTimeout,
            Self::AnswerValidation(_) => ErrorKind::AnswerValidation,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a failed statement may be repaired by regenerating it.
    pub fn is_refinable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::QuerySyntax
                | ErrorKind::QueryExecution
                | ErrorKind::UnsafeStatement
                | ErrorKind::SchemaViolation
        )
    }

    /// Human-readable explanation for end users. Never includes backend text.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::BackendUnavailable => {
                "The data source is unavailable right now. Please try again shortly."
            }
            ErrorKind::WorkflowTimeout | ErrorKind::GenerationTimeout => {
                "Answering this question took too long. Please try a narrower question."
            }
            ErrorKind::EmptyResult => "No matching data was found for this question.",
            ErrorKind::QuerySyntax
            | ErrorKind::QueryExecution
            | ErrorKind::UnsafeStatement
            | ErrorKind::SchemaViolation => {
                "I wasn't able to work out how to answer that question. Please try rephrasing it."
            }
            _ => "Something went wrong while answering this question. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refinable_kinds() {
        assert!(GraphRagError::QuerySyntax("bad".into()).is_refinable());
        assert!(GraphRagError::SchemaViolation("Foo".into()).is_refinable());
        assert!(!GraphRagError::EmptyResult.is_refinable());
        assert!(!GraphRagError::BackendUnavailable("down".into()).is_refinable());
    }

    #[test]
    fn user_message_hides_backend_detail() {
        let err = GraphRagError::QuerySyntax("Invalid input 'MATC' at line 1".into());
        assert!(!err.user_message().contains("MATC"));
        assert_eq!(err.kind().as_str(), "query_syntax");
    }
}
