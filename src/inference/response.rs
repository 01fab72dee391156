//! Response parser for non-streaming chat completions.
//!
//! Turns the raw JSON body into a [`ModelTurn`]. The assistant message is
//! rebuilt in wire shape so it can be echoed back on the next request; the
//! endpoint expects to see its own tool calls before the matching `tool`
//! messages.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ChatMessage, FunctionCallResponse, ModelTurn, Role, ToolCallRequest, ToolCallResponse};

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    #[serde(default)]
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    /// Some providers send an object instead of a JSON string.
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

/// Parse a `POST /chat/completions` response body.
///
/// Only the first choice is used. An empty `tool_calls` array is treated the
/// same as no tool calls.
pub fn parse_completion_response(body: &str) -> Result<ModelTurn, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.trim().is_empty());

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest {
            id: tc.id.filter(|id| !id.is_empty()).unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: tc.function.name,
            arguments: arguments_text(tc.function.arguments),
        })
        .collect();

    let wire_calls = (!tool_calls.is_empty()).then(|| {
        tool_calls
            .iter()
            .map(|tc| ToolCallResponse {
                id: tc.id.clone(),
                r#type: "function".to_string(),
                function: FunctionCallResponse {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect()
    });

    let message = ChatMessage {
        role: Role::Assistant,
        content: content.clone(),
        name: None,
        tool_call_id: None,
        tool_calls: wire_calls,
    };

    Ok(ModelTurn {
        message,
        content,
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

/// Normalize the `arguments` field to JSON text.
fn arguments_text(value: Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "{}".to_string(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => "{}".to_string(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"You've spent $128.50 in total."},"finish_reason":"stop"}]}"#;
        let turn = parse_completion_response(body).unwrap();
        assert_eq!(turn.content.as_deref(), Some("You've spent $128.50 in total."));
        assert!(!turn.requests_tools());
        assert!(turn.message.tool_calls.is_none());
        assert_eq!(turn.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "get_total_expenses", "arguments": "{\"userId\":\"u1\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "get_user_categories", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let turn = parse_completion_response(body).unwrap();
        assert!(turn.content.is_none());
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].id, "call_a");
        assert_eq!(turn.tool_calls[1].name, "get_user_categories");

        let echoed = turn.message.tool_calls.as_ref().unwrap();
        assert_eq!(echoed.len(), 2);
        assert_eq!(echoed[0].function.arguments, r#"{"userId":"u1"}"#);
        assert_eq!(echoed[0].r#type, "function");
    }

    #[test]
    fn test_missing_tool_call_id_is_generated() {
        let body = r#"{"choices":[{"message":{"tool_calls":[{"function":{"name":"get_expense_summary","arguments":"{}"}}]}}]}"#;
        let turn = parse_completion_response(body).unwrap();
        assert!(turn.tool_calls[0].id.starts_with("call_"));
        assert_eq!(
            turn.message.tool_calls.as_ref().unwrap()[0].id,
            turn.tool_calls[0].id
        );
    }

    #[test]
    fn test_object_arguments_are_stringified() {
        let body = r#"{"choices":[{"message":{"tool_calls":[{"id":"c","function":{"name":"get_user_expenses","arguments":{"startDate":"2024-01-01"}}}]}}]}"#;
        let turn = parse_completion_response(body).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&turn.tool_calls[0].arguments).unwrap();
        assert_eq!(parsed["startDate"], "2024-01-01");
    }

    #[test]
    fn test_empty_tool_calls_array_is_text_turn() {
        let body = r#"{"choices":[{"message":{"content":"done","tool_calls":[]}}]}"#;
        let turn = parse_completion_response(body).unwrap();
        assert!(!turn.requests_tools());
        assert!(turn.message.tool_calls.is_none());
    }

    #[test]
    fn test_empty_choices_is_error() {
        let err = parse_completion_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_completion_response("<html>bad gateway</html>").is_err());
    }
}
