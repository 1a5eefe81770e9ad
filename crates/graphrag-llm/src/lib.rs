//! GraphRAG LLM: text generation and embedding providers.
//!
//! The workflow only sees the [`LlmProvider`] and [`Embedder`] traits. The
//! OpenAI-compatible implementations here speak the `/chat/completions` and
//! `/embeddings` HTTP APIs, which also covers local servers exposing the
//! same shape.

pub mod embedding;
pub mod openai;
pub mod provider;

pub use embedding::{Embedder, EmbeddingConfig, OpenAiEmbedder};
pub use openai::{LlmConfig, OpenAiChatProvider};
pub use provider::{LlmError, LlmProvider, Message, Role};
