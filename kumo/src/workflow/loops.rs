//! Loop workflow composites.
//!
//! [`WhileAgent`] repeats its body while a predicate over `(state,
//! iteration)` holds, guarded by an iteration cap. [`ForEachAgent`] runs
//! its body once per element of a collection stored in state, binding the
//! element to `loop.item` and its index to `loop.index`; both keys are
//! removed again after the final iteration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::{Agent, AgentIdentity, AgentKind, RunContext, SharedAgent};
use crate::error::{AgentError, Result};
use crate::event::{EventBus, EventEmitter};
use crate::state::State;

use super::status::StatusBoard;

/// State key the current element is bound to during `for_each`.
pub const LOOP_ITEM_KEY: &str = "loop.item";
/// State key the current index is bound to during `for_each`.
pub const LOOP_INDEX_KEY: &str = "loop.index";

/// Default cap on while-loop iterations.
pub const DEFAULT_LOOP_CAP: usize = 100;

/// A predicate over the state and the 0-based iteration counter.
pub type LoopPredicate = Arc<dyn Fn(&State, usize) -> bool + Send + Sync>;

/// Repeats a body agent while the predicate holds.
///
/// The predicate may depend on mutations made by earlier iterations. When
/// the predicate still holds at the iteration cap, the composite fails
/// with [`ErrorCode::LoopCapExceeded`](crate::ErrorCode::LoopCapExceeded).
pub struct WhileAgent {
    identity: AgentIdentity,
    predicate: LoopPredicate,
    body: SharedAgent,
    cap: usize,
    dispatcher: Option<EventBus>,
    status: StatusBoard,
}

impl std::fmt::Debug for WhileAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhileAgent")
            .field("name", &self.identity.name)
            .field("body", &self.body.name())
            .field("cap", &self.cap)
            .finish_non_exhaustive()
    }
}

impl WhileAgent {
    /// Create a while-loop composite.
    pub fn new<F>(name: impl Into<String>, predicate: F, body: SharedAgent) -> Self
    where
        F: Fn(&State, usize) -> bool + Send + Sync + 'static,
    {
        let status = StatusBoard::new([body.name().to_string()]);
        Self {
            identity: AgentIdentity::new(name, AgentKind::Loop),
            predicate: Arc::new(predicate),
            body,
            cap: DEFAULT_LOOP_CAP,
            dispatcher: None,
            status,
        }
    }

    /// Override the iteration cap.
    #[must_use]
    pub const fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// Attach an event bus for workflow-step events.
    #[must_use]
    pub fn with_dispatcher(mut self, bus: EventBus) -> Self {
        self.dispatcher = Some(bus);
        self
    }

    /// Snapshot of the body's status.
    #[must_use]
    pub fn status(&self) -> std::collections::HashMap<String, super::status::ChildStatus> {
        self.status.snapshot()
    }
}

#[async_trait]
impl Agent for WhileAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        self.status.reset();
        let body_name = self.body.name().to_string();
        let mut state = state;
        let mut iteration = 0usize;

        loop {
            ctx.ensure_active("while iteration")?;
            if !(self.predicate)(&state, iteration) {
                break;
            }
            if iteration >= self.cap {
                let err = AgentError::loop_cap_exceeded(self.cap);
                self.status.mark_failed(&body_name, &err.to_string());
                return Err(err);
            }

            debug!(composite = %self.identity.name, iteration, "While iteration");
            emitter.emit_workflow_step(&body_name, iteration, self.cap).await;
            self.status.mark_running(&body_name);
            match self.body.run(ctx, state).await {
                Ok(next) => {
                    self.status.mark_completed(&body_name);
                    state = next;
                }
                Err(err) => {
                    self.status.mark_failed(&body_name, &err.to_string());
                    return Err(err);
                }
            }
            iteration += 1;
        }
        Ok(state)
    }
}

/// Runs a body agent once per element of the collection at
/// `collection_key`.
///
/// With no collection (or a non-array value) at the key, the state passes
/// through unchanged apart from a `foreach_missing_collection` metadata
/// warning.
pub struct ForEachAgent {
    identity: AgentIdentity,
    collection_key: String,
    body: SharedAgent,
    dispatcher: Option<EventBus>,
    status: StatusBoard,
}

impl std::fmt::Debug for ForEachAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForEachAgent")
            .field("name", &self.identity.name)
            .field("collection_key", &self.collection_key)
            .field("body", &self.body.name())
            .finish_non_exhaustive()
    }
}

impl ForEachAgent {
    /// Create a for-each composite over the collection at `collection_key`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        collection_key: impl Into<String>,
        body: SharedAgent,
    ) -> Self {
        let status = StatusBoard::new([body.name().to_string()]);
        Self {
            identity: AgentIdentity::new(name, AgentKind::Loop),
            collection_key: collection_key.into(),
            body,
            dispatcher: None,
            status,
        }
    }

    /// Attach an event bus for workflow-step events.
    #[must_use]
    pub fn with_dispatcher(mut self, bus: EventBus) -> Self {
        self.dispatcher = Some(bus);
        self
    }

    /// Snapshot of the body's status.
    #[must_use]
    pub fn status(&self) -> std::collections::HashMap<String, super::status::ChildStatus> {
        self.status.snapshot()
    }
}

#[async_trait]
impl Agent for ForEachAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        self.status.reset();
        let mut state = state;

        let Some(Value::Array(items)) = state.get(&self.collection_key).cloned() else {
            debug!(
                composite = %self.identity.name,
                key = %self.collection_key,
                "No collection to iterate",
            );
            state.set_meta(
                "foreach_missing_collection",
                Value::String(self.collection_key.clone()),
            );
            return Ok(state);
        };

        let body_name = self.body.name().to_string();
        let total = items.len();
        for (index, item) in items.into_iter().enumerate() {
            ctx.ensure_active("for_each element")?;
            emitter.emit_workflow_step(&body_name, index, total).await;

            state.set(LOOP_ITEM_KEY, item);
            state.set(LOOP_INDEX_KEY, Value::from(index));
            self.status.mark_running(&body_name);
            match self.body.run(ctx, state).await {
                Ok(next) => {
                    self.status.mark_completed(&body_name);
                    state = next;
                }
                Err(err) => {
                    self.status.mark_failed(&body_name, &err.to_string());
                    return Err(err);
                }
            }
        }

        // The binding keys are loop-internal; downstream steps see only
        // what the body wrote.
        state.remove(LOOP_ITEM_KEY);
        state.remove(LOOP_INDEX_KEY);
        Ok(state)
    }
}
