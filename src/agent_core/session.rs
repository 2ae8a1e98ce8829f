//! Session: per-conversation state.
//!
//! A `Session` is an explicit value passed by `&mut` into the dispatcher and
//! orchestrator. It owns the workspace binding, the current media-plan
//! working copy, the deletion confirmation slot, strategic notes and the
//! append-only history of messages and tool calls. Nothing here is shared
//! between sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::confirmation::ConfirmationState;
use super::errors::AgentError;
use super::types::{ConversationMessage, MediaPlanRef, ToolCallRecord, WorkspaceRef};
use crate::inference::types::{Role, ToolCall};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Maximum length of the strategic summary written into plan comments.
pub const STRATEGIC_SUMMARY_MAX_CHARS: usize = 500;

/// Business context is cut to this many characters in the summary.
const CONTEXT_SNIPPET_CHARS: usize = 80;

const MAX_SUMMARY_OBJECTIVES: usize = 3;
const MAX_SUMMARY_CHANNELS: usize = 4;

// ─── Strategic Context ──────────────────────────────────────────────────────

/// Planning notes gathered during consultation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategicContext {
    pub business_context: Option<String>,
    pub objectives: Vec<String>,
    pub target_audience: Map<String, Value>,
    pub budget_info: Map<String, Value>,
    pub timeline: Map<String, Value>,
    pub channel_preferences: Vec<String>,
    pub constraints: Vec<String>,
    pub success_metrics: Vec<String>,
    pub industry_context: Option<String>,
    pub competitive_context: Option<String>,
}

impl StrategicContext {
    /// Merge one note. Lists are extended without duplicates; every other
    /// value replaces the previous one.
    fn merge(&mut self, key: &str, value: Value) -> Result<(), AgentError> {
        let mut current = serde_json::to_value(&*self)
            .map_err(|e| AgentError::validation(format!("strategic context: {e}")))?;
        let Some(fields) = current.as_object_mut() else {
            return Err(AgentError::validation("strategic context is not an object"));
        };
        let Some(existing) = fields.get_mut(key) else {
            return Err(AgentError::validation(format!(
                "unknown strategic context key '{key}'"
            )));
        };

        // A bare string audience is shorthand for its demographics.
        let value = match (key, value) {
            ("target_audience", Value::String(s)) => serde_json::json!({ "demographics": s }),
            (_, v) => v,
        };

        match (existing, value) {
            (Value::Array(list), Value::Array(items)) => {
                for item in items {
                    if !list.contains(&item) {
                        list.push(item);
                    }
                }
            }
            (Value::Array(list), item @ Value::String(_)) => {
                if !list.contains(&item) {
                    list.push(item);
                }
            }
            (slot, v) => *slot = v,
        }

        *self = serde_json::from_value(current).map_err(|e| {
            AgentError::validation(format!("strategic context value for '{key}': {e}"))
        })?;
        Ok(())
    }

    /// Compact one-line summary for the plan's comments field.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(ctx) = self.business_context.as_deref().filter(|c| !c.is_empty()) {
            let mut short: String = ctx.chars().take(CONTEXT_SNIPPET_CHARS).collect();
            if ctx.chars().count() > CONTEXT_SNIPPET_CHARS {
                short.push_str("...");
            }
            parts.push(format!("Context: {short}"));
        }

        if !self.objectives.is_empty() {
            parts.push(format!(
                "Objectives: {}",
                capped_list(&self.objectives, MAX_SUMMARY_OBJECTIVES)
            ));
        }

        let mut audience = Vec::new();
        if let Some(age) = self.target_audience.get("age_range") {
            audience.push(format!("Age: {}", display_value(age)));
        }
        if let Some(demo) = self.target_audience.get("demographics") {
            audience.push(display_value(demo));
        }
        if !audience.is_empty() {
            parts.push(format!("Audience: {}", audience.join(", ")));
        }

        if !self.channel_preferences.is_empty() {
            parts.push(format!(
                "Channels: {}",
                capped_list(&self.channel_preferences, MAX_SUMMARY_CHANNELS)
            ));
        }

        parts
            .join(" | ")
            .chars()
            .take(STRATEGIC_SUMMARY_MAX_CHARS)
            .collect()
    }
}

fn capped_list(items: &[String], max: usize) -> String {
    let mut s = items
        .iter()
        .take(max)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > max {
        s.push_str("...");
    }
    s
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Snapshot of session state for status displays and the LLM prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub duration_minutes: f64,
    pub conversation_turns: usize,
    pub tool_calls: usize,
    pub workspace_loaded: bool,
    pub has_current_mediaplan: bool,
    pub has_strategic_context: bool,
    pub pending_deletion: Option<String>,
}

/// One conversation's state.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    workspace: Option<WorkspaceRef>,
    media_plan: Option<MediaPlanRef>,
    confirmation: ConfirmationState,
    strategic_context: Option<StrategicContext>,
    history: Vec<ConversationMessage>,
    tool_calls: Vec<ToolCallRecord>,
    turns: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Start an empty session with a fresh id.
    pub fn new() -> Self {
        let now = Utc::now();
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("session_{}_{}", now.format("%Y%m%d_%H%M%S"), &short[..8]),
            created_at: now,
            last_activity: now,
            workspace: None,
            media_plan: None,
            confirmation: ConfirmationState::Idle,
            strategic_context: None,
            history: Vec::new(),
            tool_calls: Vec::new(),
            turns: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> Option<&WorkspaceRef> {
        self.workspace.as_ref()
    }

    pub fn media_plan(&self) -> Option<&MediaPlanRef> {
        self.media_plan.as_ref()
    }

    pub fn media_plan_mut(&mut self) -> Option<&mut MediaPlanRef> {
        self.touch();
        self.media_plan.as_mut()
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn strategic_context(&self) -> Option<&StrategicContext> {
        self.strategic_context.as_ref()
    }

    pub fn confirmation(&self) -> &ConfirmationState {
        &self.confirmation
    }

    pub(crate) fn confirmation_mut(&mut self) -> &mut ConfirmationState {
        &mut self.confirmation
    }

    /// Target of a deletion waiting for the user's yes/no.
    pub fn pending_deletion(&self) -> Option<&str> {
        self.confirmation.pending_target()
    }

    // ─── Bindings ───────────────────────────────────────────────────────

    /// Bind a workspace. Switching to a different workspace drops the
    /// current plan and any pending deletion, which belonged to the old one.
    pub fn bind_workspace(&mut self, workspace: WorkspaceRef) {
        let switching = self
            .workspace
            .as_ref()
            .is_some_and(|w| w.id != workspace.id);
        if switching {
            self.media_plan = None;
            self.confirmation = ConfirmationState::Idle;
        }
        tracing::info!(
            session = %self.id,
            workspace_id = %workspace.id,
            switching,
            "workspace bound"
        );
        self.workspace = Some(workspace);
        self.touch();
    }

    /// Make `plan` the current working copy. Requires a bound workspace.
    pub fn bind_media_plan(&mut self, plan: MediaPlanRef) -> Result<(), AgentError> {
        if self.workspace.is_none() {
            return Err(AgentError::precondition(
                "no workspace loaded; call load_workspace first",
            ));
        }
        tracing::info!(session = %self.id, media_plan_id = %plan.id, "media plan bound");
        self.media_plan = Some(plan);
        self.touch();
        Ok(())
    }

    /// Forget the current plan (used after it is deleted).
    pub fn clear_media_plan(&mut self) {
        self.media_plan = None;
        self.touch();
    }

    // ─── History ────────────────────────────────────────────────────────

    /// Append a plain message. User messages count as conversation turns.
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) {
        if role == Role::User {
            self.turns += 1;
        }
        self.push(ConversationMessage {
            timestamp: Utc::now(),
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    /// Append the assistant's request for tool calls.
    pub fn append_tool_request(&mut self, content: Option<String>, calls: Vec<ToolCall>) {
        self.push(ConversationMessage {
            timestamp: Utc::now(),
            role: Role::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        });
    }

    /// Append the serialized result of one tool call.
    pub fn append_tool_result(&mut self, tool_call_id: &str, content: impl Into<String>) {
        self.push(ConversationMessage {
            timestamp: Utc::now(),
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        });
    }

    pub fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.tool_calls.push(record);
        self.touch();
    }

    fn push(&mut self, message: ConversationMessage) {
        self.history.push(message);
        self.touch();
    }

    // ─── Strategic Context ──────────────────────────────────────────────

    /// Merge one strategic note (see [`StrategicContext`] for the rule).
    pub fn note_strategic_context(&mut self, key: &str, value: Value) -> Result<(), AgentError> {
        let mut ctx = self.strategic_context.clone().unwrap_or_default();
        ctx.merge(key, value)?;
        self.strategic_context = Some(ctx);
        self.touch();
        Ok(())
    }

    /// Merge several notes at once. Either every note applies or none does.
    pub fn note_strategic_notes(&mut self, notes: &Map<String, Value>) -> Result<(), AgentError> {
        let mut ctx = self.strategic_context.clone().unwrap_or_default();
        for (key, value) in notes {
            ctx.merge(key, value.clone())?;
        }
        self.strategic_context = Some(ctx);
        self.touch();
        Ok(())
    }

    /// Summary for plan comments; empty when nothing has been noted.
    pub fn strategic_summary(&self) -> String {
        self.strategic_context
            .as_ref()
            .map(StrategicContext::summary)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            duration_minutes: (self.last_activity - self.created_at).num_seconds() as f64 / 60.0,
            conversation_turns: self.turns,
            tool_calls: self.tool_calls.len(),
            workspace_loaded: self.workspace.is_some(),
            has_current_mediaplan: self.media_plan.is_some(),
            has_strategic_context: self.strategic_context.is_some(),
            pending_deletion: self.pending_deletion().map(str::to_string),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
