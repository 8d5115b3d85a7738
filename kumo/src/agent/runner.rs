//! The LLM agent and its tool-call loop.
//!
//! [`LlmAgent`] drives a provider through the iteration loop:
//!
//! 1. Emit agent-start; fire `before_generate` hooks
//! 2. Call the provider with messages, system prompt, and tool catalog
//! 3. No tool calls → append the assistant message and finish
//! 4. Otherwise execute each requested tool call **sequentially in
//!    provider order**, retrying per the tool's policy, and append tool
//!    results so the model observes them in a deterministic order
//! 5. Loop until the model stops calling tools, the iteration cap is hit,
//!    or the context is cancelled
//!
//! Tool failures are surfaced back to the model as tool-result content
//! for self-correction; provider failures abort the run. Panics inside
//! hooks are trapped and recorded as agent-error events without stopping
//! the loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{AgentError, ErrorCode, Result};
use crate::event::{Event, EventBus, EventEmitter, ToolCallEventData, ToolResultEventData};
use crate::message::{Message, ToolCall};
use crate::output::{OutputSchema, SchemaValidator};
use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, ToolDefinition};
use crate::state::{State, StateView};
use crate::tool::{SharedTool, Tool, ToolBox, ToolContext, ToolError};
use crate::usage::Usage;

use super::builder::LlmAgentBuilder;
use super::hook::AgentHooks;
use super::registry::AgentRegistry;
use super::{Agent, AgentIdentity, RunContext};

/// Default cap on provider calls per run.
pub const DEFAULT_ITERATION_CAP: usize = 25;

/// Prefix of the synthetic tools exposed for sub-agents.
const TRANSFER_PREFIX: &str = "transfer_to_";

/// A leaf agent that drives an LLM provider through the tool-call loop.
pub struct LlmAgent {
    identity: AgentIdentity,
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: Option<String>,
    tools: ToolBox,
    hooks: Vec<Arc<dyn AgentHooks>>,
    dispatcher: Option<EventBus>,
    max_iterations: usize,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    sub_agents: Vec<String>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.identity.name)
            .field("model", &self.model)
            .field("tools", &self.tools.names())
            .field("sub_agents", &self.sub_agents)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl LlmAgent {
    /// Start building an agent.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> LlmAgentBuilder {
        LlmAgentBuilder::new(name)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_parts(
        identity: AgentIdentity,
        provider: Arc<dyn LlmProvider>,
        model: String,
        system_prompt: Option<String>,
        tools: ToolBox,
        hooks: Vec<Arc<dyn AgentHooks>>,
        dispatcher: Option<EventBus>,
        max_iterations: usize,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
        sub_agents: Vec<String>,
    ) -> Self {
        Self {
            identity,
            provider,
            model,
            system_prompt,
            tools,
            hooks,
            dispatcher,
            max_iterations,
            temperature,
            max_tokens,
            sub_agents,
        }
    }

    /// Add a tool to the agent's local catalog.
    pub fn add_tool(&mut self, tool: impl Tool + 'static) {
        self.tools.add(tool);
    }

    /// Names of the tools in the local catalog, in insertion order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.names()
    }

    /// Look up a tool in the local catalog.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&SharedTool> {
        self.tools.get(name)
    }

    /// Replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Attach an event bus for lifecycle events.
    pub fn set_event_dispatcher(&mut self, bus: EventBus) {
        self.dispatcher = Some(bus);
    }

    /// Attach an observational hook.
    pub fn with_hook(&mut self, hook: Arc<dyn AgentHooks>) {
        self.hooks.push(hook);
    }

    /// The configured iteration cap.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Hand execution to a named sub-agent.
    ///
    /// A fresh state is seeded with `input` (under the `input` key) and
    /// the parent's message history, and the sub-agent runs to completion
    /// on a derived context.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ToolNotFound`] when no agent with that name
    /// is registered, or the sub-agent's own failure.
    pub async fn transfer_to(
        &self,
        ctx: &RunContext,
        sub_agent: &str,
        reason: &str,
        input: Value,
        parent_state: &State,
    ) -> Result<State> {
        let target = AgentRegistry::global()
            .get(sub_agent)
            .ok_or_else(|| AgentError::tool_not_found(sub_agent))?;

        info!(
            from = %self.identity.name,
            to = sub_agent,
            reason,
            "Transferring to sub-agent",
        );

        let mut seeded = State::new();
        seeded.set("input", input);
        for message in parent_state.messages() {
            seeded.add_message(message.clone());
        }
        target.run(&ctx.child(), seeded).await
    }

    /// Tool catalog sent to the provider: local tools plus one synthetic
    /// `transfer_to_<name>` definition per sub-agent.
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();
        for name in &self.sub_agents {
            definitions.push(ToolDefinition {
                name: format!("{TRANSFER_PREFIX}{name}"),
                description: format!(
                    "Hand the task off to the '{name}' agent. Provide the input to forward \
                     and, optionally, the reason for the transfer."
                ),
                parameters: OutputSchema::object()
                    .with_required_property("input", OutputSchema::string())
                    .with_property("reason", OutputSchema::string())
                    .to_value(),
            });
        }
        definitions
    }

    fn build_request(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.model.clone(), messages)
            .with_tools(self.definitions());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Fire a hook closure for every hook, trapping panics.
    async fn fire_hooks<'a, F>(&'a self, emitter: &EventEmitter, stage: &'static str, make: F)
    where
        F: Fn(&'a dyn AgentHooks) -> futures::future::BoxFuture<'a, ()>,
    {
        for hook in &self.hooks {
            let fut = make(hook.as_ref());
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                let message = panic
                    .downcast_ref::<&str>()
                    .map_or_else(
                        || {
                            panic
                                .downcast_ref::<String>()
                                .cloned()
                                .unwrap_or_else(|| "opaque panic payload".to_string())
                        },
                        ToString::to_string,
                    );
                let err = AgentError::internal(format!("hook panicked during {stage}: {message}"));
                error!(agent = %self.identity.name, stage, %err, "Hook panicked");
                emitter.emit(Event::agent_error(&self.identity, &err)).await;
            }
        }
    }

    /// Execute one tool call, including parameter validation, retries,
    /// and sub-agent transfer. The outer error aborts the run
    /// (cancellation); the inner result is surfaced to the model.
    async fn execute_call(
        &self,
        ctx: &RunContext,
        emitter: &EventEmitter,
        state: &mut State,
        call: &ToolCall,
    ) -> Result<std::result::Result<Value, AgentError>> {
        // Sub-agent transfer?
        if let Some(sub_name) = call.name.strip_prefix(TRANSFER_PREFIX) {
            if self.sub_agents.iter().any(|s| s == sub_name) {
                return Ok(self.execute_transfer(ctx, state, sub_name, call).await);
            }
        }

        let Some(tool) = self.tools.get(call.name.as_str()).map(Arc::clone) else {
            warn!(agent = %self.identity.name, tool = %call.name, "Tool not found");
            return Ok(Err(AgentError::tool_not_found(&call.name)));
        };

        // Providers sometimes deliver arguments as a JSON-encoded string.
        let arguments = match &call.arguments {
            Value::String(text) => serde_json::from_str(text).unwrap_or(call.arguments.clone()),
            other => other.clone(),
        };

        // Parameter validation failures are tool errors for the model to
        // correct, not agent errors.
        let report = SchemaValidator::validate(&arguments, &tool.parameters_schema());
        if !report.valid {
            return Ok(Err(AgentError::tool_invalid_parameters(
                &call.name,
                report.summary(),
            )));
        }

        self.run_tool_with_retries(ctx, emitter, state, &tool, call, arguments)
            .await
    }

    async fn execute_transfer(
        &self,
        ctx: &RunContext,
        state: &mut State,
        sub_name: &str,
        call: &ToolCall,
    ) -> std::result::Result<Value, AgentError> {
        let input = call.arguments.get("input").cloned().unwrap_or(Value::Null);
        let reason = call
            .arguments
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");

        let final_state = self
            .transfer_to(ctx, sub_name, reason, input, state)
            .await
            .map_err(|e| {
                AgentError::wrap(
                    ErrorCode::ToolExecutionError,
                    format!("sub-agent '{sub_name}' failed"),
                    e,
                )
            })?;

        // Merge the sub-agent's fields back under a namespaced key.
        let merged: Map<String, Value> = final_state
            .kv()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let merged = Value::Object(merged);
        state.set(format!("subagent.{sub_name}"), merged.clone());
        Ok(merged)
    }

    /// Drive one tool call through its retry policy.
    #[allow(clippy::too_many_lines)]
    async fn run_tool_with_retries(
        &self,
        ctx: &RunContext,
        emitter: &EventEmitter,
        state: &State,
        tool: &SharedTool,
        call: &ToolCall,
        arguments: Value,
    ) -> Result<std::result::Result<Value, AgentError>> {
        let strategy = tool.retry_strategy();
        let max_attempts = strategy.as_ref().map_or(1, |s| s.max_attempts().max(1));
        let tool_emitter = emitter.for_tool(call.name.clone());
        let base_context = ToolContext::new(
            ctx.clone(),
            StateView::snapshot(state),
            tool_emitter,
            self.identity.clone(),
        );

        let mut attempt = 0usize;
        let mut timeout_retry_used = false;
        loop {
            ctx.ensure_active("tool invocation")?;

            if let Some(strategy) = &strategy {
                if let Err(err) = strategy.before_attempt() {
                    return Ok(Err(err));
                }
            }

            self.fire_hooks(emitter, "before_tool_call", |hook| {
                hook.before_tool_call(&call.name, &arguments).boxed()
            })
            .await;

            let tool_ctx = base_context.clone().retry(attempt);
            let started = std::time::Instant::now();
            let call_result = match ctx.remaining() {
                Some(deadline) => tokio::time::timeout(deadline, tool.call(&tool_ctx, arguments.clone()))
                    .await
                    .map_err(|_| ToolError::Timeout)
                    .and_then(|inner| inner),
                None => tool.call(&tool_ctx, arguments.clone()).await,
            };
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match call_result {
                Ok(value) => {
                    if let Some(strategy) = &strategy {
                        strategy.record_success();
                    }
                    self.fire_hooks(emitter, "after_tool_call", |hook| {
                        let value = value.clone();
                        let name = call.name.clone();
                        async move { hook.after_tool_call(&name, Some(&value), None).await }.boxed()
                    })
                    .await;
                    emitter
                        .emit(Event::tool_result(
                            &self.identity,
                            ToolResultEventData {
                                tool_name: call.name.clone(),
                                result: value.clone(),
                                request_id: call.id.clone(),
                                duration_ms,
                            },
                        ))
                        .await;
                    return Ok(Ok(value));
                }
                Err(tool_error) => {
                    let err = tool_error.into_agent_error(&call.name);
                    if let Some(strategy) = &strategy {
                        strategy.record_failure();
                    }
                    self.fire_hooks(emitter, "after_tool_call", |hook| {
                        let err = err.clone();
                        let name = call.name.clone();
                        async move { hook.after_tool_call(&name, None, Some(&err)).await }.boxed()
                    })
                    .await;

                    let will_retry = if let Some(strategy) = &strategy {
                        attempt + 1 < max_attempts && strategy.can_recover(&err)
                    } else if err.code == ErrorCode::ToolTimeout && !timeout_retry_used {
                        // A timeout gets one retry by default even without
                        // a declared strategy.
                        timeout_retry_used = true;
                        true
                    } else {
                        false
                    };

                    if will_retry {
                        attempt += 1;
                        warn!(
                            agent = %self.identity.name,
                            tool = %call.name,
                            attempt,
                            %err,
                            "Retrying tool call",
                        );
                        if let Some(strategy) = &strategy {
                            let delay = strategy.delay_for(attempt);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        continue;
                    }

                    if let Some(strategy) = &strategy {
                        if let Some(fallback) = strategy.fallback_value(&err) {
                            return Ok(fallback.map_err(|e| {
                                AgentError::wrap(
                                    ErrorCode::ToolExecutionError,
                                    format!("fallback for '{}' failed", call.name),
                                    e,
                                )
                            }));
                        }
                    }
                    return Ok(Err(err));
                }
            }
        }
    }

    /// The inner run loop, instrumented by [`Agent::run`].
    async fn run_inner(&self, ctx: &RunContext, mut state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        emitter.emit(Event::agent_start(&self.identity)).await;

        if self.max_iterations == 0 {
            let err = AgentError::iteration_cap_exceeded(0);
            emitter.emit(Event::agent_error(&self.identity, &err)).await;
            return Err(err);
        }

        let mut usage = Usage::zero();

        for iteration in 1..=self.max_iterations {
            if let Err(err) = ctx.ensure_active("provider call") {
                emitter.emit(Event::agent_error(&self.identity, &err)).await;
                return Err(err);
            }
            debug!(agent = %self.identity.name, iteration, "Starting iteration");

            // Request = system prompt + state messages.
            let mut messages = Vec::with_capacity(state.messages().len() + 1);
            if let Some(prompt) = &self.system_prompt {
                messages.push(Message::system(prompt));
            }
            messages.extend(state.messages().iter().cloned());

            self.fire_hooks(&emitter, "before_generate", |hook| {
                let messages = messages.clone();
                async move { hook.before_generate(&messages).await }.boxed()
            })
            .await;

            let response: CompletionResponse =
                match self.provider.complete(self.build_request(messages)).await {
                    Ok(response) => response,
                    Err(provider_error) => {
                        let err: AgentError = provider_error.into();
                        self.fire_hooks(&emitter, "after_generate", |hook| {
                            let err = err.clone();
                            async move { hook.after_generate(None, Some(&err)).await }.boxed()
                        })
                        .await;
                        error!(agent = %self.identity.name, iteration, %err, "Provider call failed");
                        emitter.emit(Event::agent_error(&self.identity, &err)).await;
                        return Err(err);
                    }
                };

            if let Some(reported) = response.usage {
                usage += reported;
            }
            self.fire_hooks(&emitter, "after_generate", |hook| {
                let response = response.clone();
                async move { hook.after_generate(Some(&response), None).await }.boxed()
            })
            .await;

            if !response.has_tool_calls() {
                state.add_message(response.message.clone());
                state.set_meta("usage", serde_json::to_value(usage).unwrap_or(Value::Null));
                state.set_meta("iterations", Value::from(iteration));
                info!(
                    agent = %self.identity.name,
                    iterations = iteration,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Agent run completed",
                );
                emitter.emit(Event::agent_complete(&self.identity)).await;
                return Ok(state);
            }

            // Append the assistant message carrying the calls, then execute
            // each call sequentially in provider order so the model sees
            // results deterministically ordered on its next turn.
            state.add_message(response.message.clone());
            for call in &response.tool_calls {
                if let Err(err) = ctx.ensure_active("tool invocation") {
                    emitter.emit(Event::agent_error(&self.identity, &err)).await;
                    return Err(err);
                }
                emitter
                    .emit(Event::tool_call(
                        &self.identity,
                        ToolCallEventData {
                            tool_name: call.name.clone(),
                            parameters: call.arguments.clone(),
                            request_id: call.id.clone(),
                        },
                    ))
                    .await;

                let outcome = self.execute_call(ctx, &emitter, &mut state, call).await?;
                let content = match outcome {
                    Ok(value) => {
                        serde_json::to_string(&value).unwrap_or_else(|_| value.to_string())
                    }
                    Err(err) => {
                        emitter
                            .emit(Event::tool_error(&self.identity, &call.name, &err))
                            .await;
                        serde_json::to_string(&err.to_json())
                            .unwrap_or_else(|_| err.to_string())
                    }
                };
                state.add_message(Message::tool(&call.id, &call.name, content));
            }
        }

        let err = AgentError::iteration_cap_exceeded(self.max_iterations);
        error!(agent = %self.identity.name, cap = self.max_iterations, "Iteration cap exceeded");
        emitter.emit(Event::agent_error(&self.identity, &err)).await;
        Err(err)
    }
}

#[async_trait::async_trait]
impl Agent for LlmAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let span = info_span!(
            "agent",
            agent.name = %self.identity.name,
            agent.id = %self.identity.id,
            agent.model = %self.model,
            agent.max_iterations = self.max_iterations,
        );
        self.run_inner(ctx, state).instrument(span).await
    }
}
