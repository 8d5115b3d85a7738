//! Parallel workflow composite.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::agent::{Agent, AgentIdentity, AgentKind, RunContext, SharedAgent};
use crate::error::{AgentError, ErrorAggregator, ErrorCode, Result};
use crate::event::{EventBus, EventEmitter};
use crate::state::State;

use super::status::StatusBoard;

/// How a [`ParallelAgent`] combines its children's output states.
#[derive(Clone)]
pub enum MergeStrategy {
    /// Union of keys; on conflict the last writer in child-declaration
    /// order wins. Messages and artifacts append.
    MergeAll,
    /// Return the first child to succeed; the others are cancelled.
    FirstSuccess,
    /// A user-supplied merge over the input state and every child result.
    Custom(Arc<dyn Fn(&State, Vec<Result<State>>) -> Result<State> + Send + Sync>),
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MergeAll => f.write_str("MergeAll"),
            Self::FirstSuccess => f.write_str("FirstSuccess"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Runs children concurrently, each on its own task over an independent
/// clone of the input state, then merges the results.
///
/// Concurrency is gated by a semaphore of size `max_concurrency`; with a
/// bound of 1 the composite is observationally sequential (still with
/// clone semantics). Children receive contexts derived from the parent,
/// so cancelling the parent cancels every child.
pub struct ParallelAgent {
    identity: AgentIdentity,
    children: Vec<SharedAgent>,
    max_concurrency: Option<usize>,
    merge: MergeStrategy,
    dispatcher: Option<EventBus>,
    status: StatusBoard,
}

impl std::fmt::Debug for ParallelAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelAgent")
            .field("name", &self.identity.name)
            .field("children", &self.children.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("max_concurrency", &self.max_concurrency)
            .field("merge", &self.merge)
            .finish_non_exhaustive()
    }
}

impl ParallelAgent {
    /// Create a parallel composite with the [`MergeStrategy::MergeAll`]
    /// strategy and unbounded concurrency.
    #[must_use]
    pub fn new(name: impl Into<String>, children: Vec<SharedAgent>) -> Self {
        let status = StatusBoard::new(children.iter().map(|c| c.name().to_string()));
        Self {
            identity: AgentIdentity::new(name, AgentKind::Parallel),
            children,
            max_concurrency: None,
            merge: MergeStrategy::MergeAll,
            dispatcher: None,
            status,
        }
    }

    /// Bound how many children run at once.
    #[must_use]
    pub const fn with_max_concurrency(mut self, bound: usize) -> Self {
        self.max_concurrency = Some(bound);
        self
    }

    /// Choose the merge strategy.
    #[must_use]
    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
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

    /// Spawn every child on its own task, returning the children's derived
    /// contexts (for cancellation) alongside the join handles.
    fn spawn_children(
        &self,
        ctx: &RunContext,
        state: &State,
    ) -> (Vec<RunContext>, Vec<tokio::task::JoinHandle<Result<State>>>) {
        let bound = self
            .max_concurrency
            .unwrap_or(self.children.len())
            .max(1);
        let gate = Arc::new(Semaphore::new(bound));
        let mut contexts = Vec::with_capacity(self.children.len());
        let mut handles = Vec::with_capacity(self.children.len());

        for child in &self.children {
            let child_ctx = ctx.child();
            contexts.push(child_ctx.clone());
            let child = Arc::clone(child);
            let gate = Arc::clone(&gate);
            let status = self.status.clone();
            let cloned_state = state.clone();

            handles.push(tokio::spawn(async move {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|_| AgentError::cancelled("parallel child"))?;
                child_ctx.ensure_active("parallel child")?;

                let name = child.name().to_string();
                status.mark_running(&name);
                match child.run(&child_ctx, cloned_state).await {
                    Ok(result) => {
                        status.mark_completed(&name);
                        Ok(result)
                    }
                    Err(err) => {
                        status.mark_failed(&name, &err.to_string());
                        Err(err)
                    }
                }
            }));
        }
        (contexts, handles)
    }

    fn merge_all(&self, input: &State, child_states: Vec<State>) -> State {
        let base_messages = input.messages().len();
        let mut merged = input.clone();
        for state in child_states {
            for (key, value) in state.kv() {
                merged.set(key.clone(), value.clone());
            }
            for message in state.messages().iter().skip(base_messages) {
                merged.add_message(message.clone());
            }
            for artifact in state.artifacts().values() {
                merged.add_artifact(artifact.clone());
            }
            for (key, value) in state.metadata() {
                merged.set_meta(key.clone(), value.clone());
            }
        }
        merged
    }

    fn aggregate_failures(errors: Vec<AgentError>) -> AgentError {
        let aggregator = ErrorAggregator::new();
        let count = errors.len();
        for error in errors {
            aggregator.add(error);
        }
        aggregator
            .into_error(
                ErrorCode::WorkflowChildFailed,
                format!("{count} parallel child(ren) failed"),
            )
            .unwrap_or_else(|| AgentError::internal("empty failure aggregation"))
    }
}

#[async_trait]
impl Agent for ParallelAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
        let emitter = EventEmitter::new(self.dispatcher.clone(), self.identity.clone());
        self.status.reset();
        ctx.ensure_active("parallel fan-out")?;

        let total = self.children.len();
        for (index, child) in self.children.iter().enumerate() {
            emitter.emit_workflow_step(child.name(), index, total).await;
        }
        if total == 0 {
            return Ok(state);
        }

        let (contexts, handles) = self.spawn_children(ctx, &state);

        match &self.merge {
            MergeStrategy::FirstSuccess => {
                let mut pending: FuturesUnordered<_> = handles.into_iter().collect();
                let mut failures = Vec::new();
                while let Some(joined) = pending.next().await {
                    let result = joined
                        .unwrap_or_else(|e| Err(AgentError::internal(format!("child task panicked: {e}"))));
                    match result {
                        Ok(winner) => {
                            // Cancel the losers and mark them skipped.
                            for context in &contexts {
                                context.cancel();
                            }
                            for child in &self.children {
                                self.status.mark_skipped(child.name());
                            }
                            return Ok(winner);
                        }
                        Err(err) => {
                            warn!(composite = %self.identity.name, %err, "Parallel child failed");
                            failures.push(err);
                        }
                    }
                }
                Err(Self::aggregate_failures(failures))
            }
            MergeStrategy::MergeAll | MergeStrategy::Custom(_) => {
                // Join in declaration order; merge is deterministic in
                // declaration order, not completion order.
                let mut results = Vec::with_capacity(total);
                for handle in handles {
                    results.push(handle.await.unwrap_or_else(|e| {
                        Err(AgentError::internal(format!("child task panicked: {e}")))
                    }));
                }
                ctx.ensure_active("parallel merge")?;

                if let MergeStrategy::Custom(merge) = &self.merge {
                    return merge(&state, results);
                }

                let mut states = Vec::with_capacity(total);
                let mut failures = Vec::new();
                for result in results {
                    match result {
                        Ok(child_state) => states.push(child_state),
                        Err(err) => failures.push(err),
                    }
                }
                if failures.is_empty() {
                    Ok(self.merge_all(&state, states))
                } else {
                    Err(Self::aggregate_failures(failures))
                }
            }
        }
    }
}
