//! The provider seam: how the engine reaches a model.
//!
//! Concrete transports (HTTP clients, retries, fallback chains) live outside
//! this crate and implement [`LlmProvider`].

use async_trait::async_trait;

use super::errors::InferenceError;
use super::types::{ChatRequest, ChatResponse};

/// A chat-completion backend.
///
/// Implementations own transport-level retries. Any error returned here is
/// treated by the agent loop as fatal for the current run.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, InferenceError>;
}
