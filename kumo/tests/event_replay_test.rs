//! End-to-end tests of the bus, recorder, and time-warped replay.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use kumo::event::{event_type, EventQuery, EventStorage, InMemoryEventStorage, ReplayOptions};
use kumo::prelude::*;
use tokio_util::sync::CancellationToken;

fn identity(name: &str) -> AgentIdentity {
    AgentIdentity::new(name, AgentKind::Llm)
}

/// FIFO per subscription: a subscriber observes events in publish order
/// even under concurrent publishers.
#[tokio::test]
async fn per_subscription_delivery_is_fifo() {
    let bus = EventBus::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_fn(None, move |event| {
        sink.lock().unwrap().push(event.event_type);
        Ok(())
    })
    .await;

    let id = identity("publisher");
    for i in 0..100 {
        bus.publish(Event::custom(format!("tick.{i}"), &id, serde_json::Value::Null))
            .await
            .unwrap();
    }
    bus.close().await;

    let seen = seen.lock().unwrap();
    let expected: Vec<String> = (0..100).map(|i| format!("tick.{i}")).collect();
    assert_eq!(*seen, expected);
}

/// Recording an agent run captures its lifecycle events in order.
#[tokio::test]
async fn recorder_captures_an_agent_run() {
    let bus = EventBus::new();
    let storage = Arc::new(InMemoryEventStorage::new());
    let recorder = EventRecorder::attach(&bus, Arc::clone(&storage) as _, None).await;

    let add = kumo::tool::tool("add", "Add")
        .param("a", OutputSchema::number())
        .param("b", OutputSchema::number())
        .build(|_ctx, args| async move {
            Ok(serde_json::json!(
                args["a"].as_f64().unwrap_or_default() + args["b"].as_f64().unwrap_or_default()
            ))
        });
    let provider = Arc::new(
        MockProvider::new()
            .then_tool_call("add", serde_json::json!({"a": 2, "b": 3}))
            .then_text("5"),
    );
    let agent = LlmAgent::builder("recorded")
        .provider(provider as _)
        .tool(add)
        .dispatcher(bus.clone())
        .build()
        .unwrap();

    let mut state = State::new();
    state.add_message(Message::user("2+3?"));
    agent.run(&RunContext::new(), state).await.unwrap();

    recorder.detach(&bus).await;
    bus.close().await;

    let stored = storage.query(&EventQuery::all()).await.unwrap();
    let types: Vec<&str> = stored.iter().map(|s| s.event.event_type.as_str()).collect();
    assert_eq!(
        types,
        [
            event_type::AGENT_START,
            event_type::TOOL_CALL,
            event_type::TOOL_RESULT,
            event_type::AGENT_COMPLETE,
        ]
    );
}

/// S4: five events spaced 100 ms apart replay at 2x in original order
/// with roughly 50 ms gaps.
#[tokio::test]
async fn replay_at_double_speed_halves_the_spacing() {
    let storage = Arc::new(InMemoryEventStorage::new());
    let id = identity("historical");
    let base = Utc::now() - chrono::Duration::seconds(10);
    for i in 0..5 {
        let mut event = Event::custom(format!("historical.{i}"), &id, serde_json::Value::Null);
        event.timestamp = base + chrono::Duration::milliseconds(100 * i);
        storage.append(event).await.unwrap();
    }

    let bus = EventBus::new();
    let arrivals: Arc<Mutex<Vec<(String, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&arrivals);
    bus.subscribe_fn(None, move |event| {
        sink.lock().unwrap().push((event.event_type, Instant::now()));
        Ok(())
    })
    .await;

    let replayer = EventReplayer::new(Arc::clone(&storage) as _, bus.clone()).with_options(
        ReplayOptions {
            speed: 2.0,
            loop_count: 1,
        },
    );
    let started = Instant::now();
    let published = replayer
        .replay(&EventQuery::all(), &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();
    bus.close().await;

    assert_eq!(published, 5);
    // 4 gaps of ~50 ms each.
    assert!(elapsed >= Duration::from_millis(150), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(450), "too slow: {elapsed:?}");

    let arrivals = arrivals.lock().unwrap();
    let order: Vec<&str> = arrivals.iter().map(|(t, _)| t.as_str()).collect();
    let expected: Vec<String> = (0..5).map(|i| format!("historical.{i}")).collect();
    assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());

    // Each gap is about 50 ms, within scheduling tolerance.
    for pair in arrivals.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(gap >= Duration::from_millis(25), "gap too small: {gap:?}");
        assert!(gap <= Duration::from_millis(110), "gap too large: {gap:?}");
    }
}

/// Replay order: identical timestamps fall back to publish sequence.
#[tokio::test]
async fn replay_breaks_timestamp_ties_by_sequence() {
    let storage = Arc::new(InMemoryEventStorage::new());
    let id = identity("tied");
    let stamp = Utc::now();
    for i in 0..10 {
        let mut event = Event::custom(format!("tied.{i}"), &id, serde_json::Value::Null);
        event.timestamp = stamp;
        storage.append(event).await.unwrap();
    }

    let bus = EventBus::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_fn(None, move |event| {
        sink.lock().unwrap().push(event.event_type);
        Ok(())
    })
    .await;

    EventReplayer::new(storage as _, bus.clone())
        .with_options(ReplayOptions {
            speed: 0.0,
            loop_count: 1,
        })
        .replay(&EventQuery::all(), &CancellationToken::new())
        .await
        .unwrap();
    bus.close().await;

    let seen = seen.lock().unwrap();
    let expected: Vec<String> = (0..10).map(|i| format!("tied.{i}")).collect();
    assert_eq!(*seen, expected);
}

/// Pattern subscriptions see only their namespace; tool-emitted custom
/// events land under `tool.<name>.<custom>`.
#[tokio::test]
async fn tool_custom_events_route_to_pattern_subscribers() {
    let bus = EventBus::new();
    let tool_events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tool_events);
    bus.subscribe_pattern_fn("tool.lookup.*", move |event| {
        sink.lock().unwrap().push(event.event_type);
        Ok(())
    })
    .await;

    let lookup = kumo::tool::tool("lookup", "emits progress and custom events").build(
        |ctx: ToolContext, _args| async move {
            ctx.events().emit_progress(1, 2, "searching").await;
            ctx.events()
                .emit_custom("cache_miss", serde_json::json!({"key": "k1"}))
                .await;
            Ok(serde_json::json!("found"))
        },
    );
    let provider = Arc::new(
        MockProvider::new()
            .then_tool_call("lookup", serde_json::json!({}))
            .then_text("done"),
    );
    let agent = LlmAgent::builder("emitting")
        .provider(provider as _)
        .tool(lookup)
        .dispatcher(bus.clone())
        .build()
        .unwrap();

    let mut state = State::new();
    state.add_message(Message::user("find it"));
    agent.run(&RunContext::new(), state).await.unwrap();
    bus.close().await;

    let seen = tool_events.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "tool.lookup.progress".to_string(),
            "tool.lookup.cache_miss".to_string(),
        ]
    );
}

/// The canonical wire form round-trips through every serializer.
#[tokio::test]
async fn serializers_round_trip_recorded_events() {
    use kumo::event::{
        CompactJsonSerializer, CompactSerializer, EventSerializer, PrettySerializer,
    };

    let event = Event::custom(
        "bridge.session.opened",
        &identity("bridge"),
        serde_json::json!({"payload": 1}),
    )
    .with_metadata("bridge_id", serde_json::json!("b-7"))
    .with_metadata("session_id", serde_json::json!("s-9"));

    for serializer in [
        &CompactSerializer as &dyn EventSerializer,
        &PrettySerializer,
        &CompactJsonSerializer,
    ] {
        let text = serializer.serialize(&event).unwrap();
        let back = serializer.deserialize(&text).unwrap();
        assert_eq!(back.event_type, event.event_type, "{}", serializer.name());
        assert_eq!(back.metadata["bridge_id"], serde_json::json!("b-7"));
        assert_eq!(back.metadata["session_id"], serde_json::json!("s-9"));
    }
}
