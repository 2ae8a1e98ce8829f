//! Conversation orchestrator: the per-turn loop between the model and the tools.
//!
//! One turn:
//! 1. Append the user message to the session history
//! 2. Ask the model for a decision (instructions + history + tool definitions)
//! 3. On tool calls, dispatch them one at a time and append each result
//! 4. Repeat until the model replies with text or the tool-call bound is hit
//!
//! The orchestrator holds no per-session state. Everything a turn touches
//! lives on the `Session` passed in, so one orchestrator can serve many
//! independent sessions.

use std::sync::Arc;

use serde_json::json;

use super::budget;
use super::confirmation::{CancelReason, Signal, SignalOutcome};
use super::errors::AgentError;
use super::session::Session;
use super::tokens::{estimate_request_tokens, truncate_tool_result};
use super::tool_router::ToolDispatcher;
use super::types::ConversationMessage;
use crate::inference::provider::LlmProvider;
use crate::inference::types::{ChatMessage, LlmDecision, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Maximum tool calls the model may make while answering one user message.
pub const DEFAULT_MAX_TOOL_CALLS_PER_TURN: usize = 10;

/// Maximum bytes of a single tool result fed back to the model.
///
/// At ~2.8 chars/token for JSON this is under 3K tokens, so one large
/// listing cannot crowd the rest of the conversation out of the context.
pub const MAX_TOOL_RESULT_CHARS: usize = 8_000;

/// Reply used when the model ends a turn without any text.
const EMPTY_REPLY_FALLBACK: &str = "I ran the requested tools but have nothing further to add.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert media planning assistant. You help \
users create, inspect and manage media plans stored in a workspace.

Rules:
- Load a workspace before anything else. Create or load a media plan before adding line items.
- When a tool returns structured data, show the actual values (ids, names, budgets, dates, \
counts). Do not replace them with vague summaries.
- Line items must fit the remaining budget and the campaign dates. If a tool reports a \
conflict, explain it and suggest a corrected amount or date range.
- Deleting a media plan is a two-step process. The first delete_mediaplan call only asks \
for confirmation. Ask the user to confirm the exact plan id and wait for their answer. \
Never set confirm_deletion=true unless you were told the user confirmed.
- Record planning notes the user shares (objectives, audience, channels, constraints) \
with update_strategic_context.
- Dates use the YYYY-MM-DD format. Amounts are plain numbers in the plan currency.";

// ─── Types ──────────────────────────────────────────────────────────────────

/// What a completed turn hands back to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Final assistant text for the user.
    pub reply: String,
    /// Tool calls dispatched during the turn.
    pub tool_calls: usize,
    /// A deletion target the front-end must ask the user about.
    pub pending_confirmation: Option<String>,
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    dispatcher: Arc<ToolDispatcher>,
    system_prompt: String,
    max_tool_calls: usize,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS_PER_TURN,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tool_calls(mut self, max: usize) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Answer one user message.
    ///
    /// Tool failures are fed back to the model and do not end the turn.
    /// The turn fails with `BackendError` when the model cannot be reached
    /// or when it asks for more tool calls than the per-turn bound.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        user_message: &str,
    ) -> Result<TurnOutcome, AgentError> {
        session.append_message(Role::User, user_message);
        self.drive(session).await
    }

    /// Deliver the user's answer to a pending deletion and let the model
    /// continue from there.
    pub async fn resolve_confirmation(
        &self,
        session: &mut Session,
        signal: Signal,
    ) -> Result<TurnOutcome, AgentError> {
        let outcome = self.dispatcher.resolve_confirmation(session, signal)?;
        let note = match outcome {
            SignalOutcome::Affirmed { target } => format!(
                "[confirmation] I confirm: delete media plan '{target}'. Call delete_mediaplan \
                 with confirm_deletion=true."
            ),
            SignalOutcome::Cancelled { target, reason } => format!(
                "[confirmation] Do not delete media plan '{target}' ({}). Nothing was deleted.",
                cancel_reason_text(reason)
            ),
            SignalOutcome::NoOp => {
                "[confirmation] No. There was no pending deletion to cancel.".to_string()
            }
        };
        session.append_message(Role::User, note);
        self.drive(session).await
    }

    // ─── Loop ───────────────────────────────────────────────────────────

    async fn drive(&self, session: &mut Session) -> Result<TurnOutcome, AgentError> {
        let tools = self.dispatcher.tool_definitions();
        let mut calls_made = 0usize;

        loop {
            let instructions = self.instructions(session);
            let history: Vec<ChatMessage> = session
                .history()
                .iter()
                .map(ConversationMessage::to_chat_message)
                .collect();

            tracing::debug!(
                session = %session.id(),
                messages = history.len(),
                estimated_tokens = estimate_request_tokens(&instructions, &history),
                "requesting model decision"
            );

            let decision = self
                .provider
                .decide(&instructions, &history, &tools)
                .await
                .map_err(|e| {
                    tracing::error!(session = %session.id(), error = %e, "model request failed");
                    AgentError::backend(format!("model request failed: {e}"))
                })?;

            let calls = match decision {
                LlmDecision::ToolCalls(calls) if !calls.is_empty() => calls,
                LlmDecision::ToolCalls(_) => {
                    return Ok(self.finish(session, String::new(), calls_made));
                }
                LlmDecision::FinalText(text) => {
                    return Ok(self.finish(session, text, calls_made));
                }
            };

            if calls_made + calls.len() > self.max_tool_calls {
                tracing::warn!(
                    session = %session.id(),
                    calls_made,
                    requested = calls.len(),
                    limit = self.max_tool_calls,
                    "tool-call bound exceeded"
                );
                session.append_message(
                    Role::Assistant,
                    format!(
                        "I stopped here because this request needed more than {} tool calls. \
                         Please narrow it down or continue in another message.",
                        self.max_tool_calls
                    ),
                );
                return Err(AgentError::backend(format!(
                    "turn exceeded the limit of {} tool calls",
                    self.max_tool_calls
                )));
            }

            session.append_tool_request(None, calls.clone());

            // Sequential: a call may depend on the session state left by the previous one
            for call in &calls {
                calls_made += 1;
                let payload = match self.dispatcher.dispatch_call(session, call).await {
                    Ok(result) => json!({ "ok": true, "result": result }),
                    Err(e) => e.to_payload(),
                };
                let text = payload.to_string();
                if text.len() > MAX_TOOL_RESULT_CHARS {
                    tracing::warn!(
                        tool = %call.name,
                        original_len = text.len(),
                        truncated_to = MAX_TOOL_RESULT_CHARS,
                        "tool result truncated"
                    );
                }
                session.append_tool_result(&call.id, truncate_tool_result(&text, MAX_TOOL_RESULT_CHARS));
            }
        }
    }

    fn finish(&self, session: &mut Session, text: String, tool_calls: usize) -> TurnOutcome {
        let reply = if text.trim().is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            text
        };
        session.append_message(Role::Assistant, reply.clone());

        let pending_confirmation = session.pending_deletion().map(str::to_string);
        tracing::info!(
            session = %session.id(),
            tool_calls,
            pending_confirmation = pending_confirmation.is_some(),
            "turn complete"
        );
        TurnOutcome {
            reply,
            tool_calls,
            pending_confirmation,
        }
    }

    /// Base prompt plus a snapshot of the live session state.
    fn instructions(&self, session: &Session) -> String {
        let mut state = Vec::new();

        match session.workspace() {
            Some(ws) => state.push(format!("Workspace: {} ({})", ws.name, ws.id)),
            None => state.push("Workspace: none loaded".to_string()),
        }

        match session.media_plan() {
            Some(plan) => {
                let summary = budget::summarize(plan);
                state.push(format!(
                    "Current media plan: {} for campaign '{}', {}..{}, budget {}, allocated {}, \
                     remaining {}, {} line items",
                    plan.id,
                    plan.campaign_name,
                    plan.start_date,
                    plan.end_date,
                    summary.campaign_budget,
                    summary.allocated_budget,
                    summary.remaining_budget,
                    summary.total_lineitems
                ));
            }
            None => state.push("Current media plan: none".to_string()),
        }

        if let Some(target) = session.pending_deletion() {
            state.push(format!(
                "Pending deletion of '{target}' is waiting for the user's explicit confirmation"
            ));
        }

        let strategic = session.strategic_summary();
        if !strategic.is_empty() {
            state.push(format!("Strategic context: {strategic}"));
        }

        format!(
            "{}\n\n## Session state\n- {}",
            self.system_prompt,
            state.join("\n- ")
        )
    }
}

fn cancel_reason_text(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::Rejected => "the user declined",
        CancelReason::UnrelatedCall => "another request came first",
        CancelReason::Expired => "the confirmation expired",
        CancelReason::Superseded => "another plan was selected",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
