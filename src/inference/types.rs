//! Shared types for the completion endpoint.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing. Groq and most hosted providers
//! speak the same shape.

use serde::{Deserialize, Serialize};

// ─── Transcript Messages ─────────────────────────────────────────────────────

/// A single message in the transcript.
///
/// Serialization notes:
/// - `content` is emitted as `""` (not `null`) for assistant messages that
///   only carry tool calls. Several OpenAI-compatible providers reject `null`.
/// - `name`, `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool name, set on `tool` role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlation id of the tool call a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "toolCallId")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls. Echoed back verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// A `tool` role message carrying one tool result.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// Tool definition sent in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Wrap a name, description and JSON schema as a `function` tool.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function definition within a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A tool invocation requested by the model, as parsed from one turn.
///
/// `arguments` is kept as the raw JSON text the model produced. Parsing it is
/// the dispatcher's job so that malformed arguments become a tool error
/// instead of failing the whole turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id (generated if the model doesn't provide one).
    pub id: String,
    /// Tool name as requested, e.g. `"get_total_expenses"`.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// Tool call as it appears in the OpenAI response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

/// One model turn: the assistant message plus its interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    /// The assistant message exactly as it must be echoed into the transcript.
    pub message: ChatMessage,
    /// Non-empty text content, if any.
    pub content: Option<String>,
    /// Tool calls in request order. Empty when the model answered in text.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Why the model stopped: `"stop"`, `"tool_calls"`, `"length"`, …
    pub finish_reason: Option<String>,
}

impl ModelTurn {
    /// A text-only turn. Mostly useful for fakes and tests.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            message: ChatMessage::assistant(content.clone()),
            content: Some(content).filter(|c| !c.is_empty()),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// A turn requesting the given tool calls, with no text.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        let wire = calls
            .iter()
            .map(|c| ToolCallResponse {
                id: c.id.clone(),
                r#type: "function".to_string(),
                function: FunctionCallResponse {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                },
            })
            .collect();
        Self {
            message: ChatMessage {
                role: Role::Assistant,
                content: None,
                name: None,
                tool_call_id: None,
                tool_calls: Some(wire),
            },
            content: None,
            tool_calls: calls,
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    /// Whether the model asked for at least one tool.
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_content_serializes_as_empty_string() {
        let turn = ModelTurn::tool_calls(vec![ToolCallRequest {
            id: "call_1".into(),
            name: "get_total_expenses".into(),
            arguments: "{}".into(),
        }]);
        let json = serde_json::to_value(&turn.message).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "get_total_expenses");
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_tool_message_shape() {
        let msg = ChatMessage::tool("call_9", "get_user_categories", "[]");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
        assert_eq!(json["name"], "get_user_categories");
        assert_eq!(json["content"], "[]");
    }

    #[test]
    fn test_history_accepts_camel_case_tool_call_id() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"role":"tool","content":"{}","name":"x","toolCallId":"c1"}"#,
        )
        .unwrap();
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result: Result<ChatMessage, _> =
            serde_json::from_str(r#"{"role":"developer","content":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tools_omitted_when_none() {
        let req = ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![ChatMessage::user("hi")],
            tools: None,
            tool_choice: None,
            temperature: 0.7,
            max_tokens: 1024,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tools"));
        assert!(!json.contains("tool_choice"));
    }

    #[test]
    fn test_text_turn_with_empty_content_has_no_content() {
        let turn = ModelTurn::text("");
        assert!(turn.content.is_none());
        assert!(!turn.requests_tools());
    }
}
