//! Sequential workflow composite.

use async_trait::async_trait;

use crate::agent::{Agent, AgentIdentity, AgentKind, RunContext, SharedAgent};
use crate::error::{AgentError, ErrorCode, Result};
use crate::event::{EventBus, EventEmitter};
use crate::state::State;

use super::status::StatusBoard;

/// Runs children in declared order, threading each child's output state
/// into the next child.
///
/// With `stop_on_error` (the default) the first failure aborts the run
/// and the remaining children are marked skipped. Without it, failures
/// are recorded in the state under `workflow.<child>.error` and execution
/// continues with the pre-failure state.
pub struct SequentialAgent {
    identity: AgentIdentity,
    children: Vec<SharedAgent>,
    stop_on_error: bool,
    dispatcher: Option<EventBus>,
    status: StatusBoard,
}

impl std::fmt::Debug for SequentialAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialAgent")
            .field("name", &self.identity.name)
            .field("children", &self.children.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("stop_on_error", &self.stop_on_error)
            .finish_non_exhaustive()
    }
}

impl SequentialAgent {
    /// Create a sequential composite over `children`.
    #[must_use]
    pub fn new(name: impl Into<String>, children: Vec<SharedAgent>) -> Self {
        let status = StatusBoard::new(children.iter().map(|c| c.name().to_string()));
        Self {
            identity: AgentIdentity::new(name, AgentKind::Sequential),
            children,
            stop_on_error: true,
            dispatcher: None,
            status,
        }
    }

    /// Continue past child failures, recording them in state.
    #[must_use]
    pub const fn continue_on_error(mut self) -> Self {
        self.stop_on_error = false;
        self
    }

    /// Attach an event bus for workflow-step events.
    #[must_use]
    pub fn with_dispatcher(mut self, bus: EventBus) -> Self {
        self.dispatcher = Some(bus);
        self
    }

    /// Snapshot of each child's status.
    #[must_use]
    pub fn status(&self) -> std::collections::HashMap<String, super::status::ChildStatus> {
        self.status.snapshot()
    }
}

#[async_trait]
impl Agent for SequentialAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        self.status.reset();
        let total = self.children.len();
        let mut state = state;

        for (index, child) in self.children.iter().enumerate() {
            let child_name = child.name().to_string();
            if let Err(err) = ctx.ensure_active("sequential step") {
                self.status.mark_skipped(&child_name);
                return Err(err);
            }

            emitter.emit_workflow_step(&child_name, index, total).await;
            self.status.mark_running(&child_name);

            match child.run(ctx, state.clone()).await {
                Ok(next) => {
                    self.status.mark_completed(&child_name);
                    state = next;
                }
                Err(err) => {
                    self.status.mark_failed(&child_name, &err.to_string());
                    if self.stop_on_error {
                        for remaining in &self.children[index + 1..] {
                            self.status.mark_skipped(remaining.name());
                        }
                        return Err(AgentError::wrap(
                            ErrorCode::WorkflowChildFailed,
                            format!("sequential child '{child_name}' failed"),
                            err,
                        ));
                    }
                    // Record and continue with the pre-failure state.
                    state.set(format!("workflow.{child_name}.error"), err.to_json());
                }
            }
        }
        Ok(state)
    }
}
