//! The seam between the orchestrator and whatever model answers it.

use async_trait::async_trait;

use super::errors::InferenceError;
use super::types::{ChatMessage, LlmDecision, ToolDefinition};

/// Decides the next step of a turn: call tools or reply.
///
/// Implemented by [`InferenceClient`](super::InferenceClient) for real
/// endpoints and by scripted providers in tests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn decide(
        &self,
        instructions: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmDecision, InferenceError>;
}
