//! Media-planning tools exposed to the model.
//!
//! Submodules:
//! - `workspace`: load_workspace, get_workspace_info, list_mediaplans, list_campaigns
//! - `mediaplan`: create/load/save/validate/delete media plans, create_lineitem
//! - `context`: update_strategic_context

pub mod context;
pub mod mediaplan;
pub mod workspace;

use chrono::NaiveDate;
use serde_json::Value;

use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_router::ToolDispatcher;
use crate::agent_core::types::Money;

/// Register every media-planning tool, in the order the model sees them.
pub fn register_media_tools(dispatcher: &mut ToolDispatcher) -> Result<(), AgentError> {
    workspace::register(dispatcher)?;
    mediaplan::register(dispatcher)?;
    context::register(dispatcher)?;
    Ok(())
}

// ─── Argument helpers ───────────────────────────────────────────────────────
//
// Arguments have passed schema validation before a handler runs, so these
// only convert. They still fail cleanly if called on an unvalidated value.

pub(crate) fn opt_str(args: &Value, name: &str) -> Option<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn req_str(args: &Value, name: &str) -> Result<String, AgentError> {
    opt_str(args, name)
        .ok_or_else(|| AgentError::validation(format!("argument '{name}' must be a non-empty string")))
}

pub(crate) fn req_date(args: &Value, name: &str) -> Result<NaiveDate, AgentError> {
    args.get(name)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| AgentError::validation(format!("argument '{name}' must be a YYYY-MM-DD date")))
}

pub(crate) fn req_money(args: &Value, name: &str) -> Result<Money, AgentError> {
    args.get(name)
        .and_then(Value::as_f64)
        .and_then(Money::from_units)
        .ok_or_else(|| AgentError::validation(format!("argument '{name}' must be a finite amount")))
}

pub(crate) fn opt_bool(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}
