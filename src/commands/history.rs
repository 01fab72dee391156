//! Saved-query history commands.
//!
//! Thin async wrappers over [`QueryLog`]; the store calls run on the blocking
//! pool. Every operation is scoped to one user.

use std::sync::Arc;

use crate::agent_core::AgentError;
use crate::store::{AiQuery, QueryLog};

/// Limit used when the caller does not give one.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The user's most recent saved queries, newest first.
pub async fn recent_queries(
    log: Arc<dyn QueryLog>,
    user_id: &str,
    limit: usize,
) -> Result<Vec<AiQuery>, AgentError> {
    let user_id = require_user(user_id)?;
    let queries =
        tokio::task::spawn_blocking(move || log.recent_queries(&user_id, limit)).await??;
    Ok(queries)
}

/// Saved queries whose question or answer contains `text`, ignoring case.
pub async fn search_queries(
    log: Arc<dyn QueryLog>,
    user_id: &str,
    text: &str,
) -> Result<Vec<AiQuery>, AgentError> {
    let user_id = require_user(user_id)?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AgentError::InvalidInput {
            reason: "Search text must not be empty".into(),
        });
    }
    let queries =
        tokio::task::spawn_blocking(move || log.search_queries(&user_id, &text)).await??;
    Ok(queries)
}

/// Delete one saved query. `NotFound` if the user has no such query.
pub async fn delete_query(
    log: Arc<dyn QueryLog>,
    user_id: &str,
    query_id: &str,
) -> Result<(), AgentError> {
    let user_id = require_user(user_id)?;
    let id = query_id.to_string();
    let removed = tokio::task::spawn_blocking(move || log.delete_query(&user_id, &id)).await??;
    if !removed {
        return Err(AgentError::NotFound {
            entity: "query",
            id: query_id.to_string(),
        });
    }
    tracing::info!(query_id = %query_id, "saved query deleted");
    Ok(())
}

fn require_user(user_id: &str) -> Result<String, AgentError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AgentError::InvalidInput {
            reason: "User ID is required".into(),
        });
    }
    Ok(user_id.to_string())
}
