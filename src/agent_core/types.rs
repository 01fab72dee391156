//! Shared types for the agent core.
//!
//! Tool results, run states, and the answer a run produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::inference::ChatMessage;

use super::errors::ToolError;

/// Parsed tool arguments. Always a JSON object.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

// ─── Tool Results ───────────────────────────────────────────────────────────

/// What a tool call produced: a JSON payload or an error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: String },
    Failure { error: String },
}

/// The result of one tool call. Produced for every call, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlation id copied from the request.
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(tool_call_id: &str, tool_name: &str, payload: String) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    pub fn failure(tool_call_id: &str, tool_name: &str, error: &ToolError) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            outcome: ToolOutcome::Failure {
                error: error.to_string(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    /// Transcript text: the payload, or `{"error": "<description>"}`.
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload } => payload.clone(),
            ToolOutcome::Failure { error } => serde_json::json!({ "error": error }).to_string(),
        }
    }

    /// The `tool` message that answers this call.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::tool(&self.tool_call_id, &self.tool_name, self.content())
    }
}

// ─── Run State ──────────────────────────────────────────────────────────────

/// Orchestrator states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    AwaitingModel,
    DispatchingTools,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "INIT",
            RunState::AwaitingModel => "AWAITING_MODEL",
            RunState::DispatchingTools => "DISPATCHING_TOOLS",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnswer {
    /// Final answer text. Never empty.
    pub response: String,
    /// Distinct tool names requested during the run, in first-seen order.
    pub tools_used: Vec<String>,
    /// Model↔tool round-trips performed.
    pub rounds: u32,
    /// Whether the run stopped because the round limit was hit while the
    /// model was still asking for tools.
    pub round_limit_reached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Role;

    #[test]
    fn test_failure_content_is_error_object() {
        let result = ToolResult::failure(
            "call_1",
            "get_forecast",
            &ToolError::UnknownTool {
                name: "get_forecast".into(),
            },
        );
        assert!(result.is_error());
        let content: serde_json::Value = serde_json::from_str(&result.content()).unwrap();
        assert_eq!(content["error"], "Unknown tool: get_forecast");
    }

    #[test]
    fn test_to_message_carries_correlation() {
        let result = ToolResult::success("call_7", "get_total_expenses", "{}".into());
        let msg = result.to_message();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(msg.name.as_deref(), Some("get_total_expenses"));
        assert_eq!(msg.content.as_deref(), Some("{}"));
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::AwaitingModel.to_string(), "AWAITING_MODEL");
        assert_eq!(RunState::Failed.to_string(), "FAILED");
    }
}
