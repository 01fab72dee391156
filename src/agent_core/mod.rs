//! Agent Core — tool-calling orchestration for expense questions.
//!
//! Submodules:
//! - `tool_registry`: Catalogue of expense tools (definition + executor per name)
//! - `tool_router`: Dispatches model tool calls, injecting the caller identity
//! - `orchestrator`: Per-question state machine over the completion endpoint
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod errors;
pub mod orchestrator;
pub mod tool_registry;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use errors::{AgentError, ToolError};
pub use orchestrator::{Orchestrator, FALLBACK_RESPONSE, SYSTEM_PROMPT};
pub use tool_registry::{ToolExecutor, ToolRegistry, IDENTITY_FIELD};
pub use tool_router::ToolRouter;
pub use types::{AgentAnswer, RunState, ToolArguments, ToolOutcome, ToolResult};
