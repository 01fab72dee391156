//! Agent Core error types.
//!
//! Two levels:
//! - [`ToolError`]: one tool call failed. Never leaves the dispatcher; it is
//!   rendered into the `tool` message so the model can react to it.
//! - [`AgentError`]: the run itself failed. This is what callers see.

use thiserror::Error;

use crate::inference::{CompletionFailureKind, InferenceError};
use crate::store::StoreError;

/// Failure of a single tool call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// The model asked for a tool that is not registered.
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Arguments were not a JSON object, or a field failed validation.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// The executor ran and failed (store error, panic, cancelled task).
    #[error("{reason}")]
    ExecutionFailed { reason: String },
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        ToolError::ExecutionFailed {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::ExecutionFailed {
            reason: format!("failed to serialize result: {e}"),
        }
    }
}

/// Errors that end a run, or a caller-facing operation, without an answer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No completion endpoint credential. Raised before any network call.
    #[error("completion endpoint credential is not configured: set {env_var}")]
    MissingCredential { env_var: String },

    /// The caller's request was rejected before a run started.
    #[error("{reason}")]
    InvalidInput { reason: String },

    /// The completion endpoint failed; the run cannot continue.
    #[error("completion endpoint failed: {source}")]
    Completion {
        kind: CompletionFailureKind,
        #[source]
        source: InferenceError,
    },

    /// The run did not finish within its wall-clock budget.
    #[error("run exceeded its {timeout_secs}s deadline")]
    DeadlineExceeded { timeout_secs: u64 },

    /// Configuration could not be loaded or is invalid.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// Saved-query store operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// A referenced record does not exist.
    #[error("{entity} not found: '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {reason}")]
    TaskFailed { reason: String },
}

impl AgentError {
    /// HTTP-style status code for this failure.
    ///
    /// A missing credential is a server misconfiguration (500); an endpoint
    /// rejecting the credential is 401; rate limiting is 429.
    pub fn status_code(&self) -> u16 {
        match self {
            AgentError::InvalidInput { .. } => 400,
            AgentError::NotFound { .. } => 404,
            AgentError::Completion { kind, .. } => match kind {
                CompletionFailureKind::Unauthorized => 401,
                CompletionFailureKind::RateLimited => 429,
                CompletionFailureKind::Unavailable | CompletionFailureKind::Other => 500,
            },
            AgentError::DeadlineExceeded { .. } => 504,
            AgentError::MissingCredential { .. }
            | AgentError::ConfigError { .. }
            | AgentError::DatabaseError { .. }
            | AgentError::TaskFailed { .. } => 500,
        }
    }

    /// Endpoint failure category, when the run failed at the endpoint.
    pub fn completion_kind(&self) -> Option<CompletionFailureKind> {
        match self {
            AgentError::Completion { kind, .. } => Some(*kind),
            AgentError::MissingCredential { .. } => Some(CompletionFailureKind::Unauthorized),
            _ => None,
        }
    }
}

impl From<InferenceError> for AgentError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::MissingCredential { env_var } => AgentError::MissingCredential { env_var },
            InferenceError::ConfigError { reason } => AgentError::ConfigError { reason },
            other => AgentError::Completion {
                kind: other.kind(),
                source: other,
            },
        }
    }
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => AgentError::NotFound { entity, id },
            other => AgentError::DatabaseError {
                reason: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(e: tokio::task::JoinError) -> Self {
        AgentError::TaskFailed {
            reason: e.to_string(),
        }
    }
}
