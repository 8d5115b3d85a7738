//! Observational lifecycle hooks.
//!
//! Hooks watch the four points of the tool-call loop; they cannot cancel
//! or modify execution. The engine traps panics inside hooks, records
//! them as agent-error events, and keeps the loop running.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::message::Message;
use crate::provider::CompletionResponse;

/// Lifecycle observer for an agent's run.
///
/// All methods default to no-ops; implement only the events you need.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// Called before each provider call with the messages about to be sent.
    async fn before_generate(&self, _messages: &[Message]) {}

    /// Called after each provider call with the response or the error.
    async fn after_generate(
        &self,
        _response: Option<&CompletionResponse>,
        _error: Option<&AgentError>,
    ) {
    }

    /// Called before each tool invocation.
    async fn before_tool_call(&self, _tool_name: &str, _params: &Value) {}

    /// Called after each tool invocation with the result or the error.
    async fn after_tool_call(
        &self,
        _tool_name: &str,
        _result: Option<&Value>,
        _error: Option<&AgentError>,
    ) {
    }
}

/// The hook that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl AgentHooks for NoopHooks {}

/// A hook that logs every lifecycle event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl AgentHooks for LoggingHooks {
    async fn before_generate(&self, messages: &[Message]) {
        debug!(messages = messages.len(), "Calling provider");
    }

    async fn after_generate(
        &self,
        response: Option<&CompletionResponse>,
        error: Option<&AgentError>,
    ) {
        match (response, error) {
            (Some(response), _) => debug!(
                tool_calls = response.tool_calls.len(),
                finish = ?response.finish_reason,
                "Provider responded",
            ),
            (None, Some(error)) => info!(%error, "Provider call failed"),
            (None, None) => {}
        }
    }

    async fn before_tool_call(&self, tool_name: &str, params: &Value) {
        debug!(tool = tool_name, %params, "Invoking tool");
    }

    async fn after_tool_call(
        &self,
        tool_name: &str,
        result: Option<&Value>,
        error: Option<&AgentError>,
    ) {
        match (result, error) {
            (Some(_), _) => debug!(tool = tool_name, "Tool succeeded"),
            (None, Some(error)) => info!(tool = tool_name, %error, "Tool failed"),
            (None, None) => {}
        }
    }
}
