//! Per-invocation tool context.

use chrono::{DateTime, Utc};

use crate::agent::{AgentIdentity, RunContext};
use crate::event::EventEmitter;
use crate::state::StateView;

/// Everything a tool receives besides its arguments.
///
/// Built by the agent engine immediately before each tool invocation and
/// discarded on return. The state view is a snapshot; tools communicate
/// results through their return value, never by mutating state.
#[derive(Debug, Clone)]
pub struct ToolContext {
    run: RunContext,
    state: StateView,
    events: EventEmitter,
    agent: AgentIdentity,
    retry_count: usize,
    started_at: DateTime<Utc>,
}

impl ToolContext {
    /// Build a context for one invocation. The emitter should already be
    /// scoped to the tool (see [`EventEmitter::for_tool`]).
    #[must_use]
    pub fn new(run: RunContext, state: StateView, events: EventEmitter, agent: AgentIdentity) -> Self {
        Self {
            run,
            state,
            events,
            agent,
            retry_count: 0,
            started_at: Utc::now(),
        }
    }

    /// The same context with an updated retry count and a fresh start
    /// timestamp, for re-invocation after a failure.
    #[must_use]
    pub fn retry(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self.started_at = Utc::now();
        self
    }

    /// The cancellable execution context.
    #[must_use]
    pub const fn run(&self) -> &RunContext {
        &self.run
    }

    /// Read-only view of the agent's state at dispatch time.
    #[must_use]
    pub const fn state(&self) -> &StateView {
        &self.state
    }

    /// The event emitter, scoped to this tool.
    #[must_use]
    pub const fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Identity of the invoking agent.
    #[must_use]
    pub const fn agent(&self) -> &AgentIdentity {
        &self.agent
    }

    /// How many times this invocation has been retried (0 on the first
    /// attempt).
    #[must_use]
    pub const fn retry_count(&self) -> usize {
        self.retry_count
    }

    /// When this attempt started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the invocation should stop early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }
}
