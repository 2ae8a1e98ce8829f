//! Shared types for the agent core.
//!
//! Money, media-plan projections, workspace references, conversation
//! messages and tool-call records used across the session, dispatcher and
//! orchestrator.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::ErrorKind;
use crate::inference::types::{
    ChatMessage, FunctionCallResponse, Role, ToolCall, ToolCallResponse,
};

// ─── Money ──────────────────────────────────────────────────────────────────

/// A currency amount held as integer cents.
///
/// Integer arithmetic keeps sums exact regardless of the order in which line
/// items are added. On the wire it is a plain decimal number of units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Convert a unit amount (e.g. `1250.5`) to cents, rounding half away
    /// from zero. Returns `None` for NaN, infinities and out-of-range values.
    pub fn from_units(units: f64) -> Option<Self> {
        if !units.is_finite() {
            return None;
        }
        let cents = (units * 100.0).round();
        if cents.abs() > i64::MAX as f64 / 2.0 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn as_units(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let units = f64::deserialize(deserializer)?;
        Money::from_units(units)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {units}")))
    }
}

// ─── Media Plans ────────────────────────────────────────────────────────────

/// One budgeted placement inside a media plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub channel: String,
    pub vehicle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpi: Option<String>,
    pub cost: Money,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// In-memory working copy of a media plan.
///
/// The allocated amount is never stored here; see
/// [`crate::agent_core::budget::recompute_allocated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlanRef {
    pub id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub campaign_objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_budget: Money,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub schema_version: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

// ─── Workspaces ─────────────────────────────────────────────────────────────

/// Handle to a loaded workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
}

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single entry of session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: Option<String>,
    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `tool` role: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Unparseable arguments are kept as a raw string and echoed back verbatim.
fn wire_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

impl ConversationMessage {
    /// Convert to the wire message sent to the model.
    pub fn to_chat_message(&self) -> ChatMessage {
        let tool_calls = self.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCallResponse {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: FunctionCallResponse {
                        name: tc.name.clone(),
                        arguments: wire_arguments(&tc.arguments),
                    },
                })
                .collect()
        });
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tool_calls,
        }
    }
}

// ─── Tool Calls ─────────────────────────────────────────────────────────────

/// Outcome of a dispatched tool call: exactly one of success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: serde_json::Value },
    Failure { kind: ErrorKind, detail: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// Record of one tool dispatch, kept in session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_units_rounds_to_cents() {
        assert_eq!(Money::from_units(1250.5).unwrap().cents(), 125050);
        assert_eq!(Money::from_units(0.1).unwrap().cents(), 10);
        assert!(Money::from_units(f64::NAN).is_none());
        assert!(Money::from_units(f64::INFINITY).is_none());
    }

    #[test]
    fn test_money_sum_is_order_independent() {
        let items: Vec<Money> = [0.1, 0.2, 0.3, 1e6, 0.07]
            .iter()
            .map(|v| Money::from_units(*v).unwrap())
            .collect();
        let forward: Money = items.iter().copied().sum();
        let backward: Money = items.iter().rev().copied().sum();
        assert_eq!(forward, backward);
        assert_eq!(forward.cents(), 100_000_067);
    }

    #[test]
    fn test_money_display_and_serde() {
        assert_eq!(Money::from_cents(123456).to_string(), "1234.56");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");

        let json = serde_json::to_string(&Money::from_cents(5000)).unwrap();
        assert_eq!(json, "50.0");
        let back: Money = serde_json::from_str("50000").unwrap();
        assert_eq!(back.cents(), 5_000_000);
    }

    #[test]
    fn test_tool_outcome_tagging() {
        let ok = ToolOutcome::Success {
            payload: serde_json::json!({"count": 1}),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");

        let err = ToolOutcome::Failure {
            kind: ErrorKind::ValidationError,
            detail: "bad".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "ValidationError");
        assert!(!err.is_success());
    }

    #[test]
    fn test_message_to_chat_message_serializes_arguments() {
        let msg = ConversationMessage {
            timestamp: Utc::now(),
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".into(),
                name: "load_workspace".into(),
                arguments: serde_json::json!({"workspace_id": "ws"}),
            }, ToolCall {
                id: "call_2".into(),
                name: "list_mediaplans".into(),
                arguments: serde_json::json!("{not json"),
            }]),
            tool_call_id: None,
        };
        let chat = msg.to_chat_message();
        let calls = chat.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "load_workspace");
        assert_eq!(calls[0].function.arguments, r#"{"workspace_id":"ws"}"#);
        assert_eq!(calls[1].function.arguments, "{not json");
    }
}
