//! Chat commands: answer a question, report readiness.
//!
//! `ask` wraps one orchestrator run with the caller-facing bookkeeping:
//! 1. Validate the request
//! 2. Make sure the user row exists (detached, best-effort)
//! 3. Run the orchestrator
//! 4. Save the question/answer pair (best-effort)
//! 5. Build the response, using the saved id and timestamp when available

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_core::{AgentError, Orchestrator, ToolRegistry, ToolRouter};
use crate::inference::{AssistantConfig, ChatMessage, CompletionEndpoint, InferenceClient};
use crate::store::{AiQuery, ExpenseDatabase, ExpenseStore, NewAiQuery, QueryLog};

// ─── Request / Response Types ───────────────────────────────────────────────

/// A question from a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    /// Earlier turns of the conversation, replayed before the new message.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

/// The answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Saved query id, or a fresh UUID if saving failed.
    pub id: String,
    /// The trimmed question.
    pub query: String,
    pub response: String,
    pub tools_used: Vec<String>,
    /// RFC 3339.
    pub timestamp: String,
}

/// Readiness report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub status: String,
    /// Whether a completion endpoint credential is present.
    pub configured: bool,
    pub message: String,
    /// Result of a live endpoint check, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
}

// ─── ChatContext ────────────────────────────────────────────────────────────

/// Everything `ask` needs, shared by all concurrent requests.
pub struct ChatContext<E> {
    pub orchestrator: Arc<Orchestrator<E>>,
    pub query_log: Arc<dyn QueryLog>,
}

impl<E> Clone for ChatContext<E> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            query_log: Arc::clone(&self.query_log),
        }
    }
}

impl<E: CompletionEndpoint> ChatContext<E> {
    /// Wire an endpoint to the standard tools over `db`.
    pub fn with_endpoint(endpoint: E, config: &AssistantConfig, db: Arc<ExpenseDatabase>) -> Self {
        let store: Arc<dyn ExpenseStore> = db.clone();
        let router = ToolRouter::new(Arc::new(ToolRegistry::standard()), store);
        let orchestrator = Orchestrator::new(endpoint, router).with_config(config);
        Self {
            orchestrator: Arc::new(orchestrator),
            query_log: db,
        }
    }
}

impl ChatContext<InferenceClient> {
    /// Build the production context.
    ///
    /// Fails with `MissingCredential` when no API key is configured, before
    /// any network call.
    pub fn from_config(config: &AssistantConfig, db: Arc<ExpenseDatabase>) -> Result<Self, AgentError> {
        let client = InferenceClient::from_config(config)?;
        tracing::info!(
            model = %client.model_name(),
            max_tool_rounds = config.max_tool_rounds,
            run_timeout_secs = config.run_timeout_secs,
            "chat context ready"
        );
        Ok(Self::with_endpoint(client, config, db))
    }
}

// ─── Commands ───────────────────────────────────────────────────────────────

/// Answer one question.
pub async fn ask<E: CompletionEndpoint>(
    ctx: &ChatContext<E>,
    request: AskRequest,
) -> Result<ChatResponse, AgentError> {
    let (user_id, query) = validate_request(&request)?;

    tracing::info!(
        user_id = %user_id,
        query_len = query.len(),
        history_len = request.conversation_history.len(),
        "ask received"
    );

    ensure_user_in_background(Arc::clone(&ctx.query_log), user_id.clone());

    let answer = ctx
        .orchestrator
        .run(&user_id, &query, &request.conversation_history)
        .await?;

    let saved = save_exchange(
        Arc::clone(&ctx.query_log),
        NewAiQuery {
            user_id: user_id.clone(),
            query_text: Some(query.clone()),
            ai_response: Some(answer.response.clone()),
        },
    )
    .await;

    let (id, timestamp) = match saved {
        Some(q) => (q.id, q.created_at),
        None => (Uuid::new_v4().to_string(), chrono::Utc::now().to_rfc3339()),
    };

    Ok(ChatResponse {
        id,
        query,
        response: answer.response,
        tools_used: answer.tools_used,
        timestamp,
    })
}

/// Report whether the assistant can answer questions.
pub fn chat_status(config: &AssistantConfig) -> StatusResponse {
    let configured = config.has_credential();
    StatusResponse {
        status: "ok".to_string(),
        configured,
        message: if configured {
            "Chat is ready".to_string()
        } else {
            format!("Completion endpoint key not configured (set {})", config.api_key_env)
        },
        reachable: None,
    }
}

/// [`chat_status`] plus a live `GET /models` against the endpoint.
pub async fn chat_status_checked(config: &AssistantConfig) -> StatusResponse {
    let mut status = chat_status(config);
    if let Ok(client) = InferenceClient::from_config(config) {
        let reachable = client.health_check().await;
        if !reachable {
            status.message = format!("Completion endpoint at {} is not reachable", config.base_url);
        }
        status.reachable = Some(reachable);
    }
    status
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Check the request and return the trimmed user id and question.
///
/// The trimmed id is the identity the tools run as and the owner of the saved
/// query, so it must match what the history commands look up.
fn validate_request(request: &AskRequest) -> Result<(String, String), AgentError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AgentError::InvalidInput {
            reason: "User ID is required".into(),
        });
    }
    let query = request.message.trim();
    if query.is_empty() {
        return Err(AgentError::InvalidInput {
            reason: "Message is required and must be a non-empty string".into(),
        });
    }
    Ok((user_id.to_string(), query.to_string()))
}

/// Create the user row if missing. Never awaited; failures are only logged.
fn ensure_user_in_background(log: Arc<dyn QueryLog>, user_id: String) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = log.ensure_user(&user_id) {
            tracing::warn!(user_id = %user_id, error = %e, "failed to ensure user exists");
        }
    });
}

/// Save the exchange. `None` on any failure.
async fn save_exchange(log: Arc<dyn QueryLog>, query: NewAiQuery) -> Option<AiQuery> {
    let user_id = query.user_id.clone();
    match tokio::task::spawn_blocking(move || log.save_query(&query)).await {
        Ok(Ok(saved)) => Some(saved),
        Ok(Err(e)) => {
            tracing::warn!(user_id = %user_id, error = %e, "failed to save query");
            None
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "save query task failed");
            None
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
