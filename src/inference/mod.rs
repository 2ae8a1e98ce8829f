//! Inference client: OpenAI-compatible API client for the planning model.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions with native JSON tool calls
//! - Fallback chain management
//! - The `LlmProvider` seam used by the orchestrator
//!
//! The client speaks the OpenAI Chat Completions API, so swapping the model
//! is a config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod provider;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{ModelConfig, ModelsConfig};
pub use errors::InferenceError;
pub use provider::LlmProvider;
pub use types::{ChatMessage, LlmDecision, Role, ToolCall, ToolDefinition};
