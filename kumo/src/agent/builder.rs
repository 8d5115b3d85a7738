//! Builder for [`LlmAgent`].

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::event::EventBus;
use crate::provider::LlmProvider;
use crate::tool::{SharedTool, Tool, ToolBox};

use super::hook::AgentHooks;
use super::runner::{LlmAgent, DEFAULT_ITERATION_CAP};
use super::{AgentIdentity, AgentKind};

/// Fluent configuration for an [`LlmAgent`].
///
/// # Example
///
/// ```rust,ignore
/// let agent = LlmAgent::builder("calculator")
///     .provider(Arc::new(provider))
///     .system_prompt("You are a calculator.")
///     .tool(add_tool)
///     .max_iterations(10)
///     .build()?;
/// ```
pub struct LlmAgentBuilder {
    name: String,
    provider: Option<Arc<dyn LlmProvider>>,
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

impl std::fmt::Debug for LlmAgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgentBuilder")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.names())
            .field("sub_agents", &self.sub_agents)
            .finish_non_exhaustive()
    }
}

impl LlmAgentBuilder {
    pub(super) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
            model: "default".to_string(),
            system_prompt: None,
            tools: ToolBox::new(),
            hooks: Vec::new(),
            dispatcher: None,
            max_iterations: DEFAULT_ITERATION_CAP,
            temperature: None,
            max_tokens: None,
            sub_agents: Vec::new(),
        }
    }

    /// The LLM provider to drive. Required.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Model identifier passed to the provider.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a tool to the agent's catalog.
    #[must_use]
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.add(tool);
        self
    }

    /// Add an already-shared tool.
    #[must_use]
    pub fn shared_tool(mut self, tool: SharedTool) -> Self {
        self.tools.add_shared(tool);
        self
    }

    /// Attach an observational hook.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn AgentHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Attach an event bus for lifecycle events.
    #[must_use]
    pub fn dispatcher(mut self, bus: EventBus) -> Self {
        self.dispatcher = Some(bus);
        self
    }

    /// Cap on provider calls per run (default 25). A cap of zero fails
    /// the run before the first provider call.
    #[must_use]
    pub const fn max_iterations(mut self, cap: usize) -> Self {
        self.max_iterations = cap;
        self
    }

    /// Sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Output token cap per provider call.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Declare a sub-agent by registry name; a synthetic
    /// `transfer_to_<name>` tool is exposed for it.
    #[must_use]
    pub fn sub_agent(mut self, name: impl Into<String>) -> Self {
        self.sub_agents.push(name.into());
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no provider was set.
    pub fn build(self) -> Result<LlmAgent> {
        let provider = self.provider.ok_or_else(|| {
            AgentError::configuration(format!(
                "agent '{}' has no provider configured",
                self.name
            ))
        })?;
        Ok(LlmAgent::from_parts(
            AgentIdentity::new(self.name, AgentKind::Llm),
            provider,
            self.model,
            self.system_prompt,
            self.tools,
            self.hooks,
            self.dispatcher,
            self.max_iterations,
            self.temperature,
            self.max_tokens,
            self.sub_agents,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent as _;
    use crate::provider::MockProvider;

    #[test]
    fn build_requires_a_provider() {
        let err = LlmAgentBuilder::new("p").build().expect_err("no provider");
        assert_eq!(err.code, crate::error::ErrorCode::Configuration);
    }

    #[test]
    fn defaults_are_applied() {
        let agent = LlmAgentBuilder::new("a")
            .provider(Arc::new(MockProvider::new()))
            .build()
            .expect("valid");
        assert_eq!(agent.name(), "a");
        assert_eq!(agent.max_iterations(), DEFAULT_ITERATION_CAP);
        assert!(agent.list_tools().is_empty());
    }
}
