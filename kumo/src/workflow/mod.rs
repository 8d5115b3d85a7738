//! Workflow composites.
//!
//! Sequential, parallel, conditional, and loop agents all implement the
//! same [`Agent`](crate::agent::Agent) contract as a leaf LLM agent, so
//! composites nest arbitrarily: a parallel child can be a sequential
//! pipeline whose steps are themselves conditionals. Every composite
//! keeps a [`StatusBoard`] of its children's phases for observability.

mod conditional;
mod loops;
mod parallel;
mod sequential;
mod status;

pub use conditional::{Branch, BranchPredicate, ConditionalAgent};
pub use loops::{
    ForEachAgent, LoopPredicate, WhileAgent, DEFAULT_LOOP_CAP, LOOP_INDEX_KEY, LOOP_ITEM_KEY,
};
pub use parallel::{MergeStrategy, ParallelAgent};
pub use sequential::SequentialAgent;
pub use status::{ChildPhase, ChildStatus, StatusBoard};

#[cfg(test)]
pub(crate) mod testing {
    //! Small scripted agents shared by the composite tests.

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use serde_json::{json, Value};

    use crate::agent::{Agent, AgentIdentity, AgentKind, RunContext, SharedAgent};
    use crate::error::{AgentError, Result};
    use crate::message::Message;
    use crate::state::State;

    type Behavior =
        Arc<dyn Fn(RunContext, State) -> BoxFuture<'static, Result<State>> + Send + Sync>;

    pub struct ScriptedAgent {
        identity: AgentIdentity,
        behavior: Behavior,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn identity(&self) -> &AgentIdentity {
            &self.identity
        }

        async fn run(&self, ctx: &RunContext, state: State) -> Result<State> {
            (self.behavior)(ctx.clone(), state).await
        }
    }

    fn scripted(name: &str, behavior: Behavior) -> SharedAgent {
        Arc::new(ScriptedAgent {
            identity: AgentIdentity::new(name, AgentKind::Llm),
            behavior,
        })
    }

    /// Appends its name to the `trace` array and the message history.
    pub fn recording_agent(name: &str) -> SharedAgent {
        let name_owned = name.to_string();
        scripted(name, Arc::new(move |_ctx, mut state: State| {
            let name = name_owned.clone();
            Box::pin(async move {
                let mut trace = state
                    .get("trace")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                trace.push(json!(name));
                state.set("trace", Value::Array(trace));
                state.add_message(Message::assistant(&name));
                Ok(state)
            })
        }))
    }

    /// Sets the given key/value pairs and appends one message.
    pub fn kv_agent(name: &str, pairs: Vec<(&'static str, Value)>) -> SharedAgent {
        let name_owned = name.to_string();
        scripted(name, Arc::new(move |_ctx, mut state: State| {
            let name = name_owned.clone();
            let pairs = pairs.clone();
            Box::pin(async move {
                for (key, value) in pairs {
                    state.set(key, value);
                }
                state.add_message(Message::assistant(&name));
                Ok(state)
            })
        }))
    }

    /// Always fails with a retryable execution error.
    pub fn failing_agent(name: &str) -> SharedAgent {
        let name_owned = name.to_string();
        scripted(name, Arc::new(move |_ctx, _state| {
            let name = name_owned.clone();
            Box::pin(async move {
                Err(AgentError::tool_execution(&name, "synthetic failure"))
            })
        }))
    }

    /// Sleeps, then records itself as `winner`. Observes cancellation.
    pub fn slow_agent(name: &str, delay: Duration) -> SharedAgent {
        let name_owned = name.to_string();
        scripted(name, Arc::new(move |ctx: RunContext, mut state: State| {
            let name = name_owned.clone();
            Box::pin(async move {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        state.set("winner", json!(name));
                        state.add_message(Message::assistant(&name));
                        Ok(state)
                    }
                    () = ctx.cancellation().cancelled() => {
                        Err(AgentError::cancelled(name))
                    }
                }
            })
        }))
    }

    /// Adds `loop.item` (when numeric) or 1 to the counter at `key`.
    pub fn counting_agent(name: &str, key: &'static str) -> SharedAgent {
        scripted(name, Arc::new(move |_ctx, mut state: State| {
            Box::pin(async move {
                let increment = state
                    .get(super::LOOP_ITEM_KEY)
                    .and_then(Value::as_i64)
                    .unwrap_or(1);
                let current = state.get(key).and_then(Value::as_i64).unwrap_or(0);
                state.set(key, json!(current + increment));
                Ok(state)
            })
        }))
    }
}
