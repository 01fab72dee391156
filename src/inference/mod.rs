//! Inference Client — OpenAI-compatible completion endpoint boundary.
//!
//! This module handles all communication with the hosted model:
//! - Non-streaming chat completions with a tool catalogue
//! - Response parsing into a [`ModelTurn`] (text or tool calls)
//! - Endpoint error classification (rate limit / auth / unavailable)
//! - Configuration loading from `config/assistant.yaml`
//!
//! The orchestrator only sees the [`CompletionEndpoint`] trait, so tests can
//! swap the HTTP client for a scripted fake.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionEndpoint, InferenceClient};
pub use config::AssistantConfig;
pub use errors::{CompletionFailureKind, InferenceError};
pub use types::{ChatMessage, ModelTurn, Role, ToolCallRequest, ToolDefinition};
