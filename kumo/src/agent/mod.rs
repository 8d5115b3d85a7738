//! The agent contract and its execution context.
//!
//! Every runnable thing in kumo, from the LLM-driven [`LlmAgent`] to every
//! workflow composite, implements [`Agent`]: take a [`State`], return a
//! [`State`]. Composites hold children as `Arc<dyn Agent>`, so a workflow
//! step can itself be a workflow, recursively.
//!
//! [`RunContext`] is the single cancellation and deadline source for a run.
//! Parallel composites derive child contexts; cancelling the parent cancels
//! every child, and the engine observes cancellation before each provider
//! call and each tool invocation.

mod builder;
mod hook;
mod registry;
mod runner;

pub use builder::LlmAgentBuilder;
pub use hook::{AgentHooks, LoggingHooks, NoopHooks};
pub use registry::AgentRegistry;
pub use runner::{LlmAgent, DEFAULT_ITERATION_CAP};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::state::State;

/// The variant of an agent, carried on events and identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// A leaf agent driving an LLM provider.
    Llm,
    /// Runs children in declared order.
    Sequential,
    /// Runs children concurrently and merges their states.
    Parallel,
    /// Routes to the first matching branch.
    Conditional,
    /// Repeats a body agent.
    Loop,
}

impl AgentKind {
    /// The string form of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Conditional => "conditional",
            Self::Loop => "loop",
        }
    }
}

/// Identity of an agent, attached to every event it emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable unique id, assigned at construction.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Which variant of agent this is.
    pub kind: AgentKind,
}

impl AgentIdentity {
    /// Create an identity with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
        }
    }
}

/// Cancellation and deadline context for a run.
///
/// The top-level context is the only cancellation source; children derived
/// via [`RunContext::child`] are cancelled with their parent. Deadlines may
/// be narrowed but never extended.
#[derive(Debug, Clone)]
pub struct RunContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Create a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child context. Cancelling the parent cancels the child;
    /// cancelling the child leaves the parent running.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            deadline: self.deadline,
        }
    }

    /// Narrow the deadline. A later deadline than the current one is
    /// ignored.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Narrow the deadline to at most `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation of this context and all children.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation has been requested or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time remaining until the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The underlying cancellation token, for `select!`-style waiting.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Error out if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Cancelled`](crate::ErrorCode::Cancelled) when
    /// the context is cancelled or past its deadline.
    pub fn ensure_active(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(AgentError::cancelled(what))
        } else {
            Ok(())
        }
    }
}

/// The agent contract.
///
/// Implementations own the passed state for the duration of `run` and
/// return the (possibly replaced) state on completion. Errors abort the
/// run; partial mutations up to the failure point are discarded with the
/// consumed state.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's identity.
    fn identity(&self) -> &AgentIdentity;

    /// The agent's name.
    fn name(&self) -> &str {
        &self.identity().name
    }

    /// Execute against `state` to completion.
    async fn run(&self, ctx: &RunContext, state: State) -> Result<State>;
}

/// A shared, type-erased agent.
pub type SharedAgent = Arc<dyn Agent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_assigns_unique_ids() {
        let a = AgentIdentity::new("a", AgentKind::Llm);
        let b = AgentIdentity::new("a", AgentKind::Llm);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn child_context_cancelled_with_parent() {
        let parent = RunContext::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = RunContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn deadline_only_narrows() {
        let now = Instant::now();
        let ctx = RunContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(60));
        assert!(ctx.remaining().expect("deadline set") <= Duration::from_secs(1));
    }

    #[test]
    fn ensure_active_reports_cancellation() {
        let ctx = RunContext::new();
        assert!(ctx.ensure_active("llm call").is_ok());
        ctx.cancel();
        let err = ctx.ensure_active("llm call").expect_err("cancelled");
        assert_eq!(err.code, crate::error::ErrorCode::Cancelled);
    }
}
