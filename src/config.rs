//! Application configuration: `mediaplan-agent.yaml`.
//!
//! One YAML file carries the model registry (top level: `active_model`,
//! `models`, `fallback_chain`), an `agent` section with dispatch limits and
//! an optional `workspace` section. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::budget::ViolationPolicy;
use crate::agent_core::confirmation::{ConfirmationPolicy, DEFAULT_CONFIRMATION_TIMEOUT_SECS};
use crate::agent_core::orchestrator::DEFAULT_MAX_TOOL_CALLS_PER_TURN;
use crate::agent_core::tool_router::{DispatchSettings, DEFAULT_TOOL_TIMEOUT_SECS};
use crate::inference::ModelsConfig;

// ─── Constants ──────────────────────────────────────────────────────────────

pub const CONFIG_FILE_NAME: &str = "mediaplan-agent.yaml";

/// Directory searched for the config file before walking upward.
pub const CONFIG_ROOT_ENV: &str = "MEDIAPLAN_AGENT_ROOT";

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find mediaplan-agent.yaml (set MEDIAPLAN_AGENT_ROOT or pass --config)")]
    NotFound,

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
}

/// Limits and policies for the orchestrator and dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_tool_calls_per_turn: usize,
    pub tool_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    /// `block` rejects a line item that breaks the budget or flight window;
    /// `warn` adds it and reports the violations.
    pub violation_policy: ViolationPolicy,
    /// Replaces the built-in system prompt when set.
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_calls_per_turn: DEFAULT_MAX_TOOL_CALLS_PER_TURN,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            violation_policy: ViolationPolicy::default(),
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Where workspaces are looked up by id. Defaults to `<data_dir>/workspaces`.
    pub workspaces_dir: Option<PathBuf>,
    /// Loaded when `load_workspace` is called without arguments.
    pub default_workspace: Option<PathBuf>,
}

impl AppConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            tool_timeout: Duration::from_secs(self.agent.tool_timeout_secs),
            confirmation: ConfirmationPolicy::new(self.agent.confirmation_timeout_secs),
            violation_policy: self.agent.violation_policy,
        }
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.workspace
            .workspaces_dir
            .clone()
            .unwrap_or_else(|| crate::data_dir().join("workspaces"))
    }

    /// The configured system prompt, or `None` to use the built-in one.
    pub fn system_prompt(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.agent.system_prompt_path else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `MEDIAPLAN_AGENT_ROOT` first, then walks upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(root) = std::env::var(CONFIG_ROOT_ENV) {
        let candidate = PathBuf::from(&root).join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound)
}

/// Load, interpolate and parse the config file.
///
/// Relative paths in the `agent` and `workspace` sections are resolved
/// against the directory holding the file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);
    let mut config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if config.agent.max_tool_calls_per_turn == 0 {
        return Err(ConfigError::Invalid {
            reason: "agent.max_tool_calls_per_turn must be at least 1".into(),
        });
    }
    if config.agent.tool_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            reason: "agent.tool_timeout_secs must be at least 1".into(),
        });
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for slot in [
        &mut config.agent.system_prompt_path,
        &mut config.workspace.workspaces_dir,
        &mut config.workspace.default_workspace,
    ] {
        if let Some(p) = slot.as_mut() {
            let expanded = PathBuf::from(expand_tilde(&p.to_string_lossy()));
            *p = if expanded.is_relative() {
                base.join(expanded)
            } else {
                expanded
            };
        }
    }

    tracing::debug!(
        path = %path.display(),
        active_model = %config.models.active_model,
        models = config.models.models.len(),
        "config loaded"
    );
    Ok(config)
}

// ─── Env-var interpolation ──────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Defaults get `~` expanded.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
active_model: local
models:
  local:
    display_name: Local
    base_url: http://localhost:11434/v1
"#;

    #[test]
    fn test_interpolate_env_vars() {
        std::env::remove_var("__MEDIAPLAN_TEST_UNSET__");
        assert_eq!(
            interpolate_env_vars("${__MEDIAPLAN_TEST_UNSET__:-/fallback/path}"),
            "/fallback/path"
        );

        std::env::set_var("__MEDIAPLAN_TEST_SET__", "/custom/path");
        assert_eq!(
            interpolate_env_vars("dir: ${__MEDIAPLAN_TEST_SET__:-/fallback}"),
            "dir: /custom/path"
        );
        std::env::remove_var("__MEDIAPLAN_TEST_SET__");

        assert_eq!(interpolate_env_vars("no vars here"), "no vars here");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/workspaces");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/workspaces"));
        assert_eq!(expand_tilde("/abs"), "/abs");
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, MINIMAL).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.models.active_model, "local");
        assert_eq!(config.agent.max_tool_calls_per_turn, 10);
        assert_eq!(config.agent.violation_policy, ViolationPolicy::Block);
        assert!(config.system_prompt().unwrap().is_none());

        let settings = config.dispatch_settings();
        assert_eq!(settings.tool_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_sections_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(dir.path().join("prompt.md"), "Be brief.").unwrap();
        std::fs::write(
            &path,
            format!(
                "{MINIMAL}agent:\n  max_tool_calls_per_turn: 4\n  violation_policy: warn\n  \
                 system_prompt_path: prompt.md\nworkspace:\n  workspaces_dir: ws\n"
            ),
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.agent.max_tool_calls_per_turn, 4);
        assert_eq!(config.agent.tool_timeout_secs, 30);
        assert_eq!(config.agent.violation_policy, ViolationPolicy::Warn);
        assert_eq!(config.workspaces_dir(), dir.path().join("ws"));
        assert_eq!(config.system_prompt().unwrap().as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_invalid_configs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "active_model: [").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));

        std::fs::write(&path, format!("{MINIMAL}agent:\n  max_tool_calls_per_turn: 0\n")).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid { .. })));

        assert!(matches!(
            load_config(&dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_find_config_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), MINIMAL).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }
}
