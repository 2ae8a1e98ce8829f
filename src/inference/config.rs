//! Model registry configuration.
//!
//! The `models` section of `mediaplan-agent.yaml` names every model the agent
//! may talk to, which one is active, and the order to fall back in.

use std::collections::HashMap;

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// A single model's endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    /// Name sent in the request body. Defaults to the registry key.
    #[serde(default)]
    pub model_name: Option<String>,
    /// e.g. `http://localhost:11434/v1`
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Name of the env var holding a bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

/// Top-level model registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve the active model configuration, respecting the fallback chain.
///
/// Returns `(model_key, ModelConfig)` for the first model present in the
/// registry. Connectivity is checked at request time by the client.
pub fn resolve_active_model(config: &ModelsConfig) -> Result<(String, ModelConfig), InferenceError> {
    model_order(config)
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::ConfigError {
            reason: format!(
                "active model '{}' not found in config and no fallback available",
                config.active_model
            ),
        })
}

/// The active model followed by the fallback chain, skipping unknown keys
/// and duplicates.
pub fn model_order(config: &ModelsConfig) -> Vec<(String, ModelConfig)> {
    let mut order: Vec<(String, ModelConfig)> = Vec::new();
    let keys = std::iter::once(&config.active_model).chain(config.fallback_chain.iter());
    for key in keys {
        if order.iter().any(|(k, _)| k == key) {
            continue;
        }
        if let Some(model) = config.models.get(key) {
            order.push((key.clone(), model.clone()));
        }
    }
    order
}

// ─── Tests ───────────────────────────────────────────────────────────────────
