//! ToolRouter — dispatches model tool calls to the registered executors.
//!
//! The ToolRouter is the trust boundary between the model's tool call
//! decisions and the expense store. It handles:
//! - Argument parsing (raw JSON text → object)
//! - Identity injection (the caller's id always overwrites `userId`)
//! - Executor lookup in the [`ToolRegistry`]
//! - Execution on the blocking pool, with panics caught
//! - Rendering every outcome, success or failure, as a [`ToolResult`]

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;

use crate::inference::ToolCallRequest;
use crate::store::ExpenseStore;

use super::errors::ToolError;
use super::tool_registry::{ToolRegistry, IDENTITY_FIELD};
use super::types::{ToolArguments, ToolResult};

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Executes tool calls against the store on behalf of one caller at a time.
///
/// Holds only shared, read-only handles, so one router serves every
/// concurrent run.
#[derive(Clone)]
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ExpenseStore>,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<dyn ExpenseStore>) -> Self {
        Self { registry, store }
    }

    /// The catalogue this router dispatches against.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Dispatch a batch of tool calls from one model turn.
    ///
    /// All calls run concurrently. Waits for every call to finish and returns
    /// one result per call, in request order. A failing call never affects
    /// the others.
    pub async fn dispatch_tool_calls(
        &self,
        tool_calls: &[ToolCallRequest],
        user_id: &str,
    ) -> Vec<ToolResult> {
        join_all(
            tool_calls
                .iter()
                .map(|tc| self.dispatch_single(tc, user_id)),
        )
        .await
    }

    /// Dispatch a single tool call. Always returns a result.
    pub async fn dispatch_single(&self, tool_call: &ToolCallRequest, user_id: &str) -> ToolResult {
        let start = Instant::now();

        match self.execute(tool_call, user_id).await {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(payload) => {
                    tracing::info!(
                        tool = %tool_call.name,
                        call_id = %tool_call.id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        result_bytes = payload.len(),
                        "tool call succeeded"
                    );
                    ToolResult::success(&tool_call.id, &tool_call.name, payload)
                }
                Err(e) => self.failed(tool_call, &ToolError::from(e), start),
            },
            Err(e) => self.failed(tool_call, &e, start),
        }
    }

    /// Resolve, augment and run one call.
    async fn execute(&self, tool_call: &ToolCallRequest, user_id: &str) -> Result<Value, ToolError> {
        let executor = self.registry.executor(&tool_call.name)?;
        let args = prepare_arguments(&tool_call.arguments, user_id)?;

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || executor(store.as_ref(), &args))
            .await
            .map_err(|e| {
                let reason = if e.is_panic() {
                    "tool executor panicked".to_string()
                } else {
                    format!("tool task was cancelled: {e}")
                };
                ToolError::ExecutionFailed { reason }
            })?
    }

    fn failed(&self, tool_call: &ToolCallRequest, error: &ToolError, start: Instant) -> ToolResult {
        tracing::warn!(
            tool = %tool_call.name,
            call_id = %tool_call.id,
            duration_ms = start.elapsed().as_millis() as u64,
            error = %error,
            "tool call failed"
        );
        ToolResult::failure(&tool_call.id, &tool_call.name, error)
    }
}

/// Parse the model's raw argument text and stamp the caller identity on it.
///
/// Empty text means no arguments. Anything that is not a JSON object is
/// rejected. Any `userId` the model supplied is replaced.
pub fn prepare_arguments(raw: &str, user_id: &str) -> Result<ToolArguments, ToolError> {
    let mut args = if raw.trim().is_empty() {
        ToolArguments::new()
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => ToolArguments::new(),
            Ok(other) => {
                return Err(ToolError::InvalidArguments {
                    reason: format!("expected a JSON object, got {other}"),
                })
            }
            Err(e) => {
                return Err(ToolError::InvalidArguments {
                    reason: format!("arguments are not valid JSON: {e}"),
                })
            }
        }
    };

    args.insert(
        IDENTITY_FIELD.to_string(),
        Value::String(user_id.to_string()),
    );
    Ok(args)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
