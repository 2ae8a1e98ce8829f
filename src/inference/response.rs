//! Chat completion response parsing.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{LlmDecision, ToolCall};

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    /// A JSON string per the API, though some servers send an object.
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Parse a non-streaming chat completion body into a decision.
///
/// Native tool calls win over text. A message with neither yields an empty
/// final reply; the orchestrator decides what to say in that case.
pub fn parse_completion_response(body: &str) -> Result<LlmDecision, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let calls = choice.message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        let mut tool_calls = Vec::with_capacity(calls.len());
        for tc in calls {
            let id = tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
            let arguments = parse_arguments(&tc.function.name, tc.function.arguments);
            tool_calls.push(ToolCall {
                id,
                name: tc.function.name,
                arguments,
            });
        }
        return Ok(LlmDecision::ToolCalls(tool_calls));
    }

    Ok(LlmDecision::FinalText(
        choice.message.content.unwrap_or_default(),
    ))
}

/// Decode the `arguments` field of a tool call.
///
/// Malformed JSON goes through a repair pass first. Text that still does
/// not parse is kept verbatim as a JSON string, so the dispatcher rejects
/// that one call with a validation error instead of the whole decision
/// failing.
fn parse_arguments(tool: &str, raw: serde_json::Value) -> serde_json::Value {
    match raw {
        serde_json::Value::String(s) if s.trim().is_empty() => serde_json::json!({}),
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(v) => v,
            Err(e) => match repair_arguments(&s) {
                Some(v) => {
                    tracing::warn!(tool = %tool, raw = %s, "repaired malformed tool arguments");
                    v
                }
                None => {
                    tracing::warn!(tool = %tool, raw = %s, error = %e, "unparseable tool arguments");
                    serde_json::Value::String(s)
                }
            },
        },
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}

// ─── Argument repair ────────────────────────────────────────────────────────

/// Fix the malformations models commonly produce in argument strings:
/// trailing commas, unclosed braces or brackets, and stray control
/// characters. Only an object result counts as repaired.
fn repair_arguments(raw: &str) -> Option<serde_json::Value> {
    let steps: [fn(&str) -> String; 3] =
        [strip_trailing_commas, close_unbalanced, strip_control_characters];

    let mut repaired = raw.trim().to_string();
    for step in steps {
        repaired = step(&repaired);
        if let Ok(v @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(&repaired) {
            return Some(v);
        }
    }
    None
}

/// Remove a `,` that is followed (past whitespace) by `}` or `]`.
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Close any braces and brackets left open outside string literals.
fn close_unbalanced(input: &str) -> String {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => open.push('}'),
            '[' if !in_string => open.push(']'),
            '}' | ']' if !in_string => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut out = input.to_string();
    if in_string {
        out.push('"');
    }
    out.extend(open.into_iter().rev());
    out
}

fn strip_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_native_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "list_mediaplans", "arguments": "{\"limit\": 5}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        match parse_completion_response(body).unwrap() {
            LlmDecision::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_abc");
                assert_eq!(calls[0].arguments["limit"], 5);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_id_and_object_arguments() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"function": {"name": "get_workspace_info", "arguments": {"x": 1}}}
        ]}}]}"#;
        let LlmDecision::ToolCalls(calls) = parse_completion_response(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments["x"], 1);
    }

    #[test]
    fn test_text_reply() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "Done."}}]}"#;
        assert_eq!(
            parse_completion_response(body).unwrap(),
            LlmDecision::FinalText("Done.".into())
        );
    }

    #[test]
    fn test_unparseable_arguments_keep_the_call() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"id": "c1", "function": {"name": "list_mediaplans", "arguments": "{not json"}},
            {"id": "c2", "function": {"name": "get_workspace_info", "arguments": "{}"}}
        ]}}]}"#;
        let LlmDecision::ToolCalls(calls) = parse_completion_response(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "list_mediaplans");
        assert_eq!(calls[0].arguments, serde_json::json!("{not json"));
        assert_eq!(calls[1].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_repairs_common_malformations() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"id": "c", "function": {"name": "list_mediaplans", "arguments": "{\"filters\": {"}}
        ]}}]}"#;
        let LlmDecision::ToolCalls(calls) = parse_completion_response(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, serde_json::json!({"filters": {}}));

        assert_eq!(
            repair_arguments(r#"{"limit": 5,}"#),
            Some(serde_json::json!({"limit": 5}))
        );
        assert_eq!(
            repair_arguments(r#"{"campaign_name": "Spring"#),
            Some(serde_json::json!({"campaign_name": "Spring"}))
        );
        assert_eq!(
            repair_arguments(r#"{"ids": ["a", "b""#),
            Some(serde_json::json!({"ids": ["a", "b"]}))
        );
        assert_eq!(repair_arguments("{not json"), None);
        assert_eq!(repair_arguments("[1, 2"), None);
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            parse_completion_response(r#"{"choices": []}"#),
            Err(InferenceError::MalformedResponse { .. })
        ));
        assert!(parse_completion_response("not json").is_err());
    }
}
