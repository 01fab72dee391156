//! OpenAI-compatible completion client.
//!
//! Sends non-streaming chat completion requests to the configured endpoint
//! (Groq by default) and parses the single assistant message that comes back.
//! The client is immutable after construction and is shared by every
//! concurrent run.

use std::future::Future;
use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::AssistantConfig;
use super::errors::InferenceError;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, ModelTurn, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for one completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

// ─── CompletionEndpoint ──────────────────────────────────────────────────────

/// The completion endpoint as seen by the orchestrator.
///
/// Given the transcript and the tool catalogue, returns one model turn:
/// either text, or a batch of tool calls. Implementations must be stateless
/// between calls.
pub trait CompletionEndpoint: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<ModelTurn, InferenceError>> + Send;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// HTTP client for the completion endpoint.
pub struct InferenceClient {
    http: HttpClient,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl InferenceClient {
    /// Create a client from the assistant configuration.
    ///
    /// Fails with `MissingCredential` when the API key variable is absent or
    /// empty. Connectivity is not checked until the first request.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, InferenceError> {
        let api_key = config.api_key()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// The model identifier sent with each request.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Build the request body for one turn.
    ///
    /// The tool catalogue is attached with `tool_choice: "auto"` whenever it
    /// is non-empty.
    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> ChatCompletionRequest {
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }

    /// Send one non-streaming chat completion request.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(messages, tools);

        // Metadata only; message bodies can hold user data
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            max_tokens = body.max_tokens,
            "completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: REQUEST_TIMEOUT.as_secs(),
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }

    /// Check whether the endpoint is reachable with the configured key.
    ///
    /// Uses `GET /models`, which does not consume completion tokens.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

impl CompletionEndpoint for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn, InferenceError> {
        self.chat_completion(messages, tools).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
