//! # kumo
//!
//! A composable AI agent runtime.
//!
//! kumo provides four tightly-coupled subsystems:
//!
//! - **Agent engine** ([`agent`]): an LLM-driven tool-call loop with
//!   observational hooks, per-tool retry policies, and sub-agent
//!   delegation through a process-wide registry.
//! - **Workflow composites** ([`workflow`]): sequential, parallel,
//!   conditional, and loop agents that implement the same [`Agent`]
//!   contract as a leaf agent and therefore nest arbitrarily.
//! - **Event bus** ([`event`]): pub/sub with pattern-matched
//!   subscriptions, composable filters, per-subscription FIFO delivery,
//!   recording, and time-warped replay.
//! - **Structured output** ([`output`]): JSON/XML/YAML parsing with
//!   multi-strategy recovery, schema validation, and cross-format
//!   conversion through a neutral tree.
//!
//! Provider wire protocols are out of scope: the engine drives anything
//! implementing [`LlmProvider`](provider::LlmProvider), and
//! [`MockProvider`](provider::MockProvider) scripts responses for tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kumo::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> kumo::Result<()> {
//!     let add = tool("add", "Add two numbers")
//!         .param("a", OutputSchema::number())
//!         .param("b", OutputSchema::number())
//!         .build(|_ctx, args| async move {
//!             let a = args["a"].as_f64().unwrap_or_default();
//!             let b = args["b"].as_f64().unwrap_or_default();
//!             Ok(serde_json::json!({"result": a + b}))
//!         });
//!
//!     let mut agent = LlmAgent::builder("calculator")
//!         .provider(Arc::new(my_provider()))
//!         .system_prompt("You are a calculator.")
//!         .tool(add)
//!         .build()?;
//!
//!     let mut state = State::new();
//!     state.add_message(Message::user("What is 2+3?"));
//!     let final_state = agent.run(&RunContext::new(), state).await?;
//!     Ok(())
//! }
//! ```

/// The agent contract, execution context, LLM agent, hooks, and registry.
pub mod agent;

/// Typed errors, the error-code taxonomy, and the error aggregator.
pub mod error;

/// Events, the bus, filters, patterns, storage, recording, and replay.
pub mod event;

/// Message and tool-call types for agent-model conversations.
pub mod message;

/// Structured-output parsing, validation, and conversion.
pub mod output;

/// The LLM provider contract and the scripted mock.
pub mod provider;

/// Recovery strategies: backoff, fallback, composite, circuit breaker.
pub mod recovery;

/// Execution state: key/value store, artifacts, messages, metadata.
pub mod state;

/// The tool contract, toolbox, registry, metadata, and invocation context.
pub mod tool;

/// Token usage accounting.
pub mod usage;

/// Workflow composites: sequential, parallel, conditional, loops.
pub mod workflow;

pub use agent::{Agent, AgentIdentity, AgentKind, LlmAgent, RunContext, SharedAgent};
pub use error::{AgentError, ErrorAggregator, ErrorCode, Result};
pub use event::{Event, EventBus, EventFilter, EventRecorder, EventReplayer};
pub use message::{Message, MessageRole, ToolCall};
pub use output::{OutputSchema, SchemaType};
pub use provider::{CompletionRequest, CompletionResponse, LlmProvider};
pub use state::{Artifact, State, StateView};
pub use tool::{Tool, ToolBox, ToolContext, ToolError};
pub use usage::Usage;

/// The most commonly used types and functions.
pub mod prelude {
    pub use crate::agent::{
        Agent, AgentHooks, AgentIdentity, AgentKind, AgentRegistry, LlmAgent, RunContext,
        SharedAgent,
    };
    pub use crate::error::{AgentError, ErrorAggregator, ErrorCode, Result};
    pub use crate::event::{
        Event, EventBus, EventEmitter, EventFilter, EventQuery, EventRecorder, EventReplayer,
        InMemoryEventStorage, ReplayOptions,
    };
    pub use crate::message::{Message, MessageRole, ToolCall};
    pub use crate::output::{
        FormatConverter, OutputParser, OutputSchema, ParserRegistry, RecoveryOptions,
        SchemaType, SchemaValidator,
    };
    pub use crate::provider::{
        CompletionRequest, CompletionResponse, LlmProvider, MockProvider, ProviderError,
    };
    pub use crate::recovery::{
        CircuitBreaker, ExponentialBackoff, RecoveryStrategy, StrategyRegistry,
    };
    pub use crate::state::{Artifact, State, StateView};
    pub use crate::tool::{tool, Tool, ToolBox, ToolContext, ToolError, ToolMetadata};
    pub use crate::usage::Usage;
    pub use crate::workflow::{
        Branch, ConditionalAgent, ForEachAgent, MergeStrategy, ParallelAgent, SequentialAgent,
        WhileAgent,
    };
}
