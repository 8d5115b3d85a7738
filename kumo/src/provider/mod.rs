//! The LLM provider contract.
//!
//! The runtime consumes providers through [`LlmProvider`]; concrete wire
//! protocols (OpenAI, Anthropic, local servers) live outside this crate.
//! [`MockProvider`] returns scripted responses for tests.

mod mock;

pub use mock::MockProvider;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{AgentError, ErrorCode};
use crate::message::{Message, ToolCall};
use crate::usage::Usage;

/// A tool's schema-only description, as sent to providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON-Schema parameter description.
    pub parameters: Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// The model requested tool calls.
    ToolCalls,
    /// The token limit was hit.
    Length,
    /// A stop sequence matched.
    StopSequence,
}

/// A completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Conversation so far, including the system prompt.
    pub messages: Vec<Message>,
    /// Model identifier, provider-specific.
    pub model: String,
    /// Tool catalog (schemas only).
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Create a request for `model` with the given conversation.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: model.into(),
            ..Self::default()
        }
    }

    /// Attach the tool catalog.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set stop sequences.
    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// A completed model response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The assistant message (carries tool calls when present).
    pub message: Message,
    /// Tool calls requested by the model, in provider order.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    /// A plain text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: FinishReason::Stop,
        }
    }

    /// A response requesting tool calls.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            message: Message::assistant_with_tool_calls("", calls.clone()),
            tool_calls: calls,
            usage: None,
            finish_reason: FinishReason::ToolCalls,
        }
    }

    /// Attach usage numbers.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Whether the model requested tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One chunk of a streamed response.
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    /// Incremental text.
    pub delta: String,
    /// Set on the final chunk.
    pub finish_reason: Option<FinishReason>,
}

/// Provider-level failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be completed.
    #[error("provider request failed: {0}")]
    Request(String),
    /// The provider throttled the caller.
    #[error("provider rate limited")]
    RateLimited,
    /// The provider did not answer in time.
    #[error("provider timed out")]
    Timeout,
    /// The response could not be interpreted.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// The provider does not implement streaming.
    #[error("streaming is not supported by this provider")]
    StreamingUnsupported,
}

impl ProviderError {
    /// Whether the failure is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        let retryable = err.is_retryable();
        Self::new(
            ErrorCode::ProviderError,
            err.to_string(),
            retryable,
            !retryable,
        )
    }
}

/// A boxed stream of completion chunks.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = std::result::Result<CompletionChunk, ProviderError>> + Send>>;

/// The contract the agent engine drives.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Complete the conversation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport or protocol failure.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Stream the completion. Optional; the default reports
    /// [`ProviderError::StreamingUnsupported`].
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport or protocol failure.
    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> std::result::Result<ChunkStream, ProviderError> {
        Err(ProviderError::StreamingUnsupported)
    }
}
