//! Data store error types.

use thiserror::Error;

/// Errors raised by the expense store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// A record that must exist was not found.
    #[error("{entity} not found: '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// The connection mutex was poisoned by a panicking holder.
    #[error("store lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError {
            reason: e.to_string(),
        }
    }
}
