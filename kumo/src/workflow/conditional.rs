//! Conditional workflow composite.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::{Agent, AgentIdentity, AgentKind, RunContext, SharedAgent};
use crate::error::Result;
use crate::event::{EventBus, EventEmitter};
use crate::state::State;

use super::status::StatusBoard;

/// A pure predicate over the input state.
pub type BranchPredicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// One conditional branch.
#[derive(Clone)]
pub struct Branch {
    name: String,
    predicate: BranchPredicate,
    agent: SharedAgent,
}

impl Branch {
    /// Create a branch from a name, a predicate, and the agent to run.
    pub fn new<F>(name: impl Into<String>, predicate: F, agent: SharedAgent) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            agent,
        }
    }

    /// The branch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .finish_non_exhaustive()
    }
}

/// Routes to the first branch whose predicate matches the input state.
///
/// Predicates are evaluated in declaration order. With no match, the
/// default branch runs when configured; otherwise the state is returned
/// unchanged with a `conditional_no_match` warning in its metadata.
pub struct ConditionalAgent {
    identity: AgentIdentity,
    branches: Vec<Branch>,
    default: Option<SharedAgent>,
    dispatcher: Option<EventBus>,
    status: StatusBoard,
}

impl std::fmt::Debug for ConditionalAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalAgent")
            .field("name", &self.identity.name)
            .field("branches", &self.branches.iter().map(Branch::name).collect::<Vec<_>>())
            .field("has_default", &self.default.is_some())
            .finish_non_exhaustive()
    }
}

impl ConditionalAgent {
    /// Create a conditional composite over `branches`.
    #[must_use]
    pub fn new(name: impl Into<String>, branches: Vec<Branch>) -> Self {
        let status = StatusBoard::new(branches.iter().map(|b| b.name.clone()));
        Self {
            identity: AgentIdentity::new(name, AgentKind::Conditional),
            branches,
            default: None,
            dispatcher: None,
            status,
        }
    }

    /// Set the default branch for when no predicate matches.
    #[must_use]
    pub fn with_default(mut self, agent: SharedAgent) -> Self {
        self.default = Some(agent);
        self
    }

    /// Attach an event bus for workflow-step events.
    #[must_use]
    pub fn with_dispatcher(mut self, bus: EventBus) -> Self {
        self.dispatcher = Some(bus);
        self
    }

    /// Snapshot of each branch's status.
    #[must_use]
    pub fn status(&self) -> std::collections::HashMap<String, super::status::ChildStatus> {
        self.status.snapshot()
    }
}

#[async_trait]
impl Agent for ConditionalAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        self.status.reset();
        ctx.ensure_active("conditional dispatch")?;

        let total = self.branches.len();
        let matched = self
            .branches
            .iter()
            .position(|branch| (branch.predicate)(&state));

        if let Some(index) = matched {
            let branch = &self.branches[index];
            for other in self.branches.iter().filter(|b| b.name != branch.name) {
                self.status.mark_skipped(&other.name);
            }
            debug!(composite = %self.identity.name, branch = %branch.name, "Branch matched");
            emitter.emit_workflow_step(&branch.name, index, total).await;

            self.status.mark_running(&branch.name);
            return match branch.agent.run(ctx, state).await {
                Ok(next) => {
                    self.status.mark_completed(&branch.name);
                    Ok(next)
                }
                Err(err) => {
                    self.status.mark_failed(&branch.name, &err.to_string());
                    Err(err)
                }
            };
        }

        for branch in &self.branches {
            self.status.mark_skipped(&branch.name);
        }

        if let Some(default) = &self.default {
            debug!(composite = %self.identity.name, "No branch matched; running default");
            emitter.emit_workflow_step("default", total, total + 1).await;
            return default.run(ctx, state).await;
        }

        debug!(composite = %self.identity.name, "No branch matched and no default");
        let mut state = state;
        state.set_meta("conditional_no_match", Value::Bool(true));
        Ok(state)
    }
}
