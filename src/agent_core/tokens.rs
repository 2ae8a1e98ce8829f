//! Size guards for what goes into the model's context.
//!
//! Character-based token heuristics for logging how large a request is,
//! and UTF-8 safe truncation for oversized tool results.

use crate::inference::types::{ChatMessage, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for English prose. Deliberately low so
/// estimates err high.
const CHARS_PER_TOKEN: f64 = 3.2;

/// JSON tokenizes more densely than prose (punctuation, short keys).
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-message overhead (role label, formatting tokens).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u32 = 10;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cap a tool result at `max_bytes`, marking the cut so the model knows the
/// payload is incomplete.
pub fn truncate_tool_result(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    format!(
        "{}... [truncated, {} bytes total; narrow the request with filters or limit]",
        truncate_utf8(text, max_bytes),
        text.len()
    )
}

// ─── Estimation ─────────────────────────────────────────────────────────────

/// Estimate the token count for a string of natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.len() as f64;
    (chars / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for JSON content (tool arguments and results).
pub fn estimate_json_tokens(json_text: &str) -> u32 {
    let chars = json_text.len() as f64;
    (chars / JSON_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for a `ChatMessage`, including tool calls.
pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
    let mut total = MESSAGE_OVERHEAD_TOKENS;

    if let Some(ref content) = message.content {
        total += match message.role {
            Role::Tool => estimate_json_tokens(content),
            _ => estimate_tokens(content),
        };
    }

    if let Some(ref calls) = message.tool_calls {
        for call in calls {
            total += TOOL_CALL_OVERHEAD_TOKENS;
            total += estimate_tokens(&call.function.name);
            total += estimate_json_tokens(&call.function.arguments);
        }
    }

    total
}

/// Estimate the size of a full request: instructions plus history.
pub fn estimate_request_tokens(instructions: &str, history: &[ChatMessage]) -> u32 {
    MESSAGE_OVERHEAD_TOKENS
        + estimate_tokens(instructions)
        + history.iter().map(estimate_message_tokens).sum::<u32>()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{FunctionCallResponse, ToolCallResponse};

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        // "hello" = 5 chars → ceil(5/3.2) = 2
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 32);
    }

    #[test]
    fn test_estimate_json_tokens() {
        // 15 chars → ceil(15/2.8) = 6
        assert_eq!(estimate_json_tokens(r#"{"limit": 1000}"#), 6);
    }

    #[test]
    fn test_estimate_message_tokens() {
        let msg = ChatMessage {
            role: Role::User,
            content: Some("Hello, world!".to_string()), // 13 chars → 5
            tool_call_id: None,
            tool_calls: None,
        };
        assert_eq!(estimate_message_tokens(&msg), 9);

        let call = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![ToolCallResponse {
                id: "call_1".to_string(),
                r#type: "function".to_string(),
                function: FunctionCallResponse {
                    name: "list_mediaplans".to_string(),
                    arguments: r#"{"limit": 5}"#.to_string(),
                },
            }]),
        };
        assert!(estimate_message_tokens(&call) > MESSAGE_OVERHEAD_TOKENS + TOOL_CALL_OVERHEAD_TOKENS);
        assert!(estimate_request_tokens("prompt", &[msg, call]) > 9);
    }

    #[test]
    fn test_truncate_utf8_ascii() {
        assert_eq!(truncate_utf8("hello world", 5), "hello");
        assert_eq!(truncate_utf8("short", 100), "short");
    }

    #[test]
    fn test_truncate_utf8_within_multibyte() {
        // '€' is 3 bytes
        let text = "€€€";
        assert_eq!(truncate_utf8(text, 4), "€");
        assert_eq!(truncate_utf8(text, 6), "€€");
    }

    #[test]
    fn test_truncate_tool_result() {
        assert_eq!(truncate_tool_result("{}", 10), "{}");
        let long = "€".repeat(100);
        let cut = truncate_tool_result(&long, 10);
        assert!(cut.starts_with("€€€..."));
        assert!(cut.contains("300 bytes total"));
    }
}
