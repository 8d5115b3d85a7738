//! End-to-end tests of workflow composition over the agent contract.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use kumo::prelude::*;
use serde_json::{json, Value};

/// A scripted leaf agent for workflow tests.
struct ScriptedAgent {
    identity: AgentIdentity,
    behavior: Arc<dyn Fn(State) -> BoxFuture<'static, Result<State>> + Send + Sync>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn run(&self, _ctx: &RunContext, state: State) -> Result<State> {
        (self.behavior)(state).await
    }
}

fn scripted<F>(name: &str, behavior: F) -> SharedAgent
where
    F: Fn(&mut State) + Send + Sync + 'static,
{
    let behavior = Arc::new(behavior);
    Arc::new(ScriptedAgent {
        identity: AgentIdentity::new(name, AgentKind::Llm),
        behavior: Arc::new(move |mut state: State| {
            let behavior = Arc::clone(&behavior);
            Box::pin(async move {
                behavior(&mut state);
                Ok(state)
            })
        }),
    })
}

/// S2: two parallel children write overlapping keys; merge_all resolves
/// conflicts by declaration order and concatenates messages.
#[tokio::test]
async fn parallel_merge_all_matches_the_declared_semantics() {
    let child = |name: &'static str| {
        scripted(name, move |state| {
            state.set("a", json!(1));
            state.set("b", json!(name));
            state.add_message(Message::assistant(name));
        })
    };
    let composite = ParallelAgent::new("fanout", vec![child("left"), child("right")]);

    let result = composite
        .run(&RunContext::new(), State::new())
        .await
        .unwrap();
    assert_eq!(result.get("a").unwrap(), &json!(1));
    assert_eq!(result.get("b").unwrap(), &json!("right"));
    let contents: Vec<&str> = result.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["left", "right"]);
}

/// State isolation: a child's mutations are invisible to its sibling
/// while both are running.
#[tokio::test]
async fn parallel_children_cannot_observe_each_other() {
    let probe = |name: &'static str, delay_ms: u64| -> SharedAgent {
        Arc::new(ScriptedAgent {
            identity: AgentIdentity::new(name, AgentKind::Llm),
            behavior: Arc::new(move |mut state: State| {
                Box::pin(async move {
                    state.set(name, json!("mine"));
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    // After sleeping, the sibling has already written its
                    // key into its own clone; ours must not show it.
                    let sibling = if name == "fast" { "slow" } else { "fast" };
                    state.set(
                        format!("{name}_saw_sibling"),
                        json!(state.get(sibling).is_some()),
                    );
                    Ok(state)
                })
            }),
        })
    };
    let composite = ParallelAgent::new("isolated", vec![probe("fast", 10), probe("slow", 100)]);
    let result = composite
        .run(&RunContext::new(), State::new())
        .await
        .unwrap();
    assert_eq!(result.get("fast_saw_sibling").unwrap(), &json!(false));
    assert_eq!(result.get("slow_saw_sibling").unwrap(), &json!(false));
}

/// S3: no predicate matches, so the default branch runs.
#[tokio::test]
async fn conditional_routes_to_default_when_nothing_matches() {
    let branch = |letter: &'static str| {
        Branch::new(
            format!("is_{letter}"),
            move |state: &State| state.get("x") == Some(&json!(letter)),
            scripted(letter, move |state| {
                state.set("ran", json!(letter));
            }),
        )
    };
    let composite = ConditionalAgent::new("router", vec![branch("a"), branch("b")])
        .with_default(scripted("agent_d", |state| {
            state.set("ran", json!("default"));
            state.set("default_touched", json!(true));
        }));

    let mut state = State::new();
    state.set("x", json!("c"));
    let result = composite.run(&RunContext::new(), state).await.unwrap();
    assert_eq!(result.get("ran").unwrap(), &json!("default"));
    assert_eq!(result.get("default_touched").unwrap(), &json!(true));
}

/// Composites nest recursively: a parallel child is a sequential pipeline
/// that contains a while loop.
#[tokio::test]
async fn composites_nest_arbitrarily() {
    let increment = scripted("increment", |state| {
        let n = state.get("n").and_then(Value::as_i64).unwrap_or(0);
        state.set("n", json!(n + 1));
    });
    let count_to_three = Arc::new(WhileAgent::new(
        "count",
        |state: &State, _| state.get("n").and_then(Value::as_i64).unwrap_or(0) < 3,
        increment,
    ));
    let pipeline = Arc::new(SequentialAgent::new(
        "pipeline",
        vec![
            count_to_three,
            scripted("label", |state| {
                state.set("labelled", json!(true));
            }),
        ],
    ));
    let fanout = ParallelAgent::new(
        "outer",
        vec![pipeline, scripted("other", |state| state.set("other", json!(true)))],
    );

    let result = fanout.run(&RunContext::new(), State::new()).await.unwrap();
    assert_eq!(result.get("n").unwrap(), &json!(3));
    assert_eq!(result.get("labelled").unwrap(), &json!(true));
    assert_eq!(result.get("other").unwrap(), &json!(true));
}

/// Sequential error recording keeps the pipeline going without
/// `stop_on_error`.
#[tokio::test]
async fn sequential_error_keys_are_namespaced_per_step() {
    struct Failing {
        identity: AgentIdentity,
    }
    #[async_trait]
    impl Agent for Failing {
        fn identity(&self) -> &AgentIdentity {
            &self.identity
        }
        async fn run(&self, _ctx: &RunContext, _state: State) -> Result<State> {
            Err(AgentError::tool_execution("step_two", "bad day"))
        }
    }

    let composite = SequentialAgent::new(
        "tolerant",
        vec![
            scripted("step_one", |state| state.set("one", json!(true))),
            Arc::new(Failing {
                identity: AgentIdentity::new("step_two", AgentKind::Llm),
            }),
            scripted("step_three", |state| state.set("three", json!(true))),
        ],
    )
    .continue_on_error();

    let result = composite
        .run(&RunContext::new(), State::new())
        .await
        .unwrap();
    assert_eq!(result.get("one").unwrap(), &json!(true));
    assert_eq!(result.get("three").unwrap(), &json!(true));
    assert!(result.get("workflow.step_two.error").is_some());
}

/// A for_each loop feeds each element to an agent pipeline.
#[tokio::test]
async fn for_each_binds_elements_for_the_body() {
    let collector = scripted("collector", |state| {
        let item = state
            .get(kumo::workflow::LOOP_ITEM_KEY)
            .cloned()
            .unwrap_or(Value::Null);
        let mut seen = state
            .get("seen")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        seen.push(item);
        state.set("seen", Value::Array(seen));
    });
    let composite = ForEachAgent::new("iterate", "items", collector);

    let mut state = State::new();
    state.set("items", json!(["x", "y", "z"]));
    let result = composite.run(&RunContext::new(), state).await.unwrap();
    assert_eq!(result.get("seen").unwrap(), &json!(["x", "y", "z"]));
    assert!(result.get(kumo::workflow::LOOP_ITEM_KEY).is_none());
}

/// Workflow-step events surface on the bus while a composite runs.
#[tokio::test]
async fn composites_emit_workflow_step_events() {
    let bus = EventBus::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_fn(Some(EventFilter::types(["workflow.step"])), move |event| {
        if let kumo::event::EventData::WorkflowStep(step) = &event.data {
            sink.lock().unwrap().push((step.step_name.clone(), step.step_index));
        }
        Ok(())
    })
    .await;

    let composite = SequentialAgent::new(
        "observed",
        vec![
            scripted("alpha", |_| {}),
            scripted("beta", |_| {}),
        ],
    )
    .with_dispatcher(bus.clone());

    composite
        .run(&RunContext::new(), State::new())
        .await
        .unwrap();
    bus.close().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("alpha".to_string(), 0), ("beta".to_string(), 1)]
    );
}
