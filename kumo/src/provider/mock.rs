//! Scripted provider for testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::message::ToolCall;
use crate::usage::Usage;

use super::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};

type Scripted = std::result::Result<CompletionResponse, ProviderError>;

/// A provider that plays back a scripted sequence of responses.
///
/// Each `complete` call consumes the next scripted entry; once the script
/// is exhausted, an empty text response is returned. Every request is
/// recorded for later inspection.
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockProvider::new()
///     .then_tool_call("add", serde_json::json!({"a": 2, "b": 3}))
///     .then_text("The answer is 5.");
/// ```
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Create a provider with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text response to the script.
    #[must_use]
    pub fn then_text(self, content: impl Into<String>) -> Self {
        self.push(Ok(
            CompletionResponse::text(content).with_usage(Usage::new(10, 5))
        ));
        self
    }

    /// Append a single-tool-call response to the script.
    #[must_use]
    pub fn then_tool_call(self, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let call = ToolCall::new(format!("call_{}", fastrand::u32(..)), name, arguments);
        self.push(Ok(
            CompletionResponse::tool_calls(vec![call]).with_usage(Usage::new(10, 5))
        ));
        self
    }

    /// Append a multi-tool-call response to the script.
    #[must_use]
    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(
            CompletionResponse::tool_calls(calls).with_usage(Usage::new(10, 5))
        ));
        self
    }

    /// Append a provider failure to the script.
    #[must_use]
    pub fn then_error(self, error: ProviderError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, entry: Scripted) {
        self.script
            .lock()
            .expect("mock provider script lock poisoned")
            .push_back(entry);
    }

    /// The requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("mock provider request lock poisoned")
            .clone()
    }

    /// Number of `complete` calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .expect("mock provider request lock poisoned")
            .len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        self.requests
            .lock()
            .expect("mock provider request lock poisoned")
            .push(request);
        self.script
            .lock()
            .expect("mock provider script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(CompletionResponse::text("")))
    }
}
