//! Completion endpoint error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the completion endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The API credential is absent or empty. Raised before any network call.
    #[error("missing completion endpoint credential: set {env_var}")]
    MissingCredential { env_var: String },

    /// TCP/HTTP connection to the endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured timeout.
    #[error("completion request timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("malformed completion response: {reason}")]
    MalformedResponse { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

/// Coarse classification of endpoint failures, for callers that need to
/// special-case rate limiting or bad credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFailureKind {
    /// HTTP 429.
    RateLimited,
    /// Missing credential, or HTTP 401/403.
    Unauthorized,
    /// Connection failure, timeout, or 5xx.
    Unavailable,
    /// Anything else: bad request, unparseable response, config.
    Other,
}

impl InferenceError {
    /// Classify this error.
    pub fn kind(&self) -> CompletionFailureKind {
        match self {
            InferenceError::MissingCredential { .. } => CompletionFailureKind::Unauthorized,
            InferenceError::HttpError { status: 401 | 403, .. } => {
                CompletionFailureKind::Unauthorized
            }
            InferenceError::HttpError { status: 429, .. } => CompletionFailureKind::RateLimited,
            InferenceError::HttpError { status: 500..=599, .. }
            | InferenceError::ConnectionFailed { .. }
            | InferenceError::Timeout { .. } => CompletionFailureKind::Unavailable,
            InferenceError::HttpError { .. }
            | InferenceError::MalformedResponse { .. }
            | InferenceError::ConfigError { .. } => CompletionFailureKind::Other,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
