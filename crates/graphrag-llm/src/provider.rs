use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from generation or embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected provider response: {0}")]
    Response(String),

    #[error("Provider timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text generation provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a message list and return its text.
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Generate a completion for a system instruction plus one user prompt.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.complete(&[Message::system(system), Message::user(prompt)])
            .await
    }

    /// Name of the provider, for logs.
    fn provider_name(&self) -> &str;
}
