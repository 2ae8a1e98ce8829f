//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests and turns the reply into an
//! [`LlmDecision`]. Walks the fallback chain when a model is unavailable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{model_order, resolve_active_model, ModelConfig, ModelsConfig};
use super::errors::InferenceError;
use super::provider::LlmProvider;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, LlmDecision, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Large histories take a while to prefill on local
/// servers, so this is well above the connect timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the configured chat completion endpoints.
///
/// Holds no per-request state, so one client can serve every session.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelsConfig,
}

impl InferenceClient {
    /// Create a client from the model registry.
    ///
    /// Fails if neither the active model nor any fallback is configured.
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: ModelsConfig) -> Result<Self, InferenceError> {
        let (_, model) = resolve_active_model(&config)?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// Display name of the first model that will be tried.
    pub fn current_model_name(&self) -> String {
        resolve_active_model(&self.config)
            .map(|(_, m)| m.display_name)
            .unwrap_or_default()
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a chat completion request, falling back through the chain on
    /// retriable failures.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<LlmDecision, InferenceError> {
        let mut attempted = Vec::new();

        for (key, model) in model_order(&self.config) {
            match self.try_request(&key, &model, &messages, &tools).await {
                Ok(decision) => return Ok(decision),
                Err(e) if e.is_retriable() => {
                    tracing::warn!(model = %key, error = %e, "model unavailable, trying next");
                    attempted.push(key);
                }
                Err(e) => return Err(e),
            }
        }

        Err(InferenceError::AllModelsUnavailable { attempted })
    }

    /// Attempt a single request against one model.
    async fn try_request(
        &self,
        key: &str,
        model: &ModelConfig,
        messages: &[ChatMessage],
        tools: &Option<Vec<ToolDefinition>>,
    ) -> Result<LlmDecision, InferenceError> {
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: model.model_name.clone().unwrap_or_else(|| key.to_string()),
            messages: messages.to_vec(),
            tools: tools.clone(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            temperature: model.temperature,
            top_p: model.top_p,
            max_tokens: model.max_tokens,
            stream: false,
        };

        // Request metadata only; the body can be huge
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            max_tokens = body.max_tokens,
            "LLM request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(var) = &model.api_key_env {
            match std::env::var(var) {
                Ok(token) => request = request.bearer_auth(token),
                Err(_) => tracing::warn!(env = %var, "api key env var not set"),
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }
}

#[async_trait]
impl LlmProvider for InferenceClient {
    async fn decide(
        &self,
        instructions: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmDecision, InferenceError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(instructions));
        messages.extend_from_slice(history);
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        self.chat_completion(messages, tools).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
