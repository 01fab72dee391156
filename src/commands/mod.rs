//! Caller-facing commands.
//!
//! The binary (and any future HTTP front end) calls these; they bridge the
//! caller to the agent core and the expense store.

pub mod chat;
pub mod history;

use std::path::Path;
use std::sync::Arc;

use crate::agent_core::AgentError;
use crate::inference::AssistantConfig;
use crate::store::ExpenseDatabase;

/// Open the expense database named in config, or the default location.
pub fn open_database(config: &AssistantConfig) -> Result<Arc<ExpenseDatabase>, AgentError> {
    let path = match &config.database_path {
        Some(path) => Path::new(path).to_path_buf(),
        None => crate::data_dir().join("expenses.db"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AgentError::DatabaseError {
            reason: format!("failed to create {}: {e}", parent.display()),
        })?;
    }

    let db = ExpenseDatabase::open(&path.to_string_lossy())?;
    tracing::info!(path = %path.display(), "expense database opened");
    Ok(Arc::new(db))
}
