//! Events and the pub/sub layer.
//!
//! An [`Event`] is a typed, timestamped record of something an agent or
//! tool did. Events are immutable once published. The [`EventBus`] fans
//! events out to filtered subscribers with FIFO delivery per subscription;
//! [`EventRecorder`] persists them to an [`EventStorage`] and
//! [`EventReplayer`] re-publishes them later with original spacing.

mod bus;
mod emitter;
mod filter;
mod pattern;
mod recorder;
mod replayer;
mod serialize;
mod storage;

pub use bus::{BusConfig, EventBus, EventHandler, OverflowPolicy, SubscriptionId};
pub use emitter::EventEmitter;
pub use filter::EventFilter;
pub use pattern::EventPattern;
pub use recorder::EventRecorder;
pub use replayer::{EventReplayer, ReplayOptions};
pub use serialize::{
    CompactJsonSerializer, CompactSerializer, EventSerializer, PrettySerializer,
};
pub use storage::{EventQuery, EventStorage, InMemoryEventStorage, StoredEvent};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::AgentIdentity;
use crate::error::AgentError;

/// Well-known event type strings.
pub mod event_type {
    /// An agent began executing.
    pub const AGENT_START: &str = "agent.start";
    /// An agent finished successfully.
    pub const AGENT_COMPLETE: &str = "agent.complete";
    /// An agent failed.
    pub const AGENT_ERROR: &str = "agent.error";
    /// The model requested a tool call.
    pub const TOOL_CALL: &str = "tool.call";
    /// A tool returned a result.
    pub const TOOL_RESULT: &str = "tool.result";
    /// A tool failed after exhausting its retries.
    pub const TOOL_ERROR: &str = "tool.error";
    /// Incremental progress from a tool or agent.
    pub const PROGRESS: &str = "progress";
    /// A free-form message.
    pub const MESSAGE: &str = "message";
    /// A workflow composite advanced to a child.
    pub const WORKFLOW_STEP: &str = "workflow.step";
}

/// Progress payload: `current` of `total`, with a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEventData {
    /// Units completed so far.
    pub current: u64,
    /// Total units, when known.
    pub total: u64,
    /// Human-readable progress description.
    pub message: String,
}

/// Payload of a tool-call event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEventData {
    /// Name of the tool being invoked.
    pub tool_name: String,
    /// Parameters passed to the tool.
    pub parameters: Value,
    /// Correlates the call with its result event.
    pub request_id: String,
}

/// Payload of a tool-result event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEventData {
    /// Name of the tool that ran.
    pub tool_name: String,
    /// The tool's result value (or serialized error on failure).
    pub result: Value,
    /// Correlates the result with its call event.
    pub request_id: String,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: u64,
}

/// Payload of a workflow-step event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepEventData {
    /// Name of the child being run.
    pub step_name: String,
    /// Zero-based index of the child.
    pub step_index: usize,
    /// Total number of children in the composite.
    pub total_steps: usize,
}

/// The typed payload of an event.
///
/// On the wire the payload is plain JSON; the variant is reconstructed
/// from the event's `type` field on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    /// No payload.
    Empty,
    /// A plain text payload (message events).
    Text(String),
    /// Progress payload.
    Progress(ProgressEventData),
    /// Tool-call payload.
    ToolCall(ToolCallEventData),
    /// Tool-result payload.
    ToolResult(ToolResultEventData),
    /// Workflow-step payload.
    WorkflowStep(WorkflowStepEventData),
    /// A serialized typed error (error events).
    Error(Value),
    /// Free-form payload for custom and bridge events.
    Custom(Value),
}

impl EventData {
    /// The payload as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(text) => Value::String(text.clone()),
            Self::Progress(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::ToolCall(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::ToolResult(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::WorkflowStep(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::Error(v) | Self::Custom(v) => v.clone(),
        }
    }

    /// Reconstruct the typed payload for `event_type` from plain JSON.
    ///
    /// Unknown types and payloads that fail to match their expected shape
    /// fall back to [`EventData::Custom`].
    #[must_use]
    pub fn from_wire(event_type: &str, value: Value) -> Self {
        if value.is_null() {
            return Self::Empty;
        }
        match event_type {
            event_type::PROGRESS => serde_json::from_value(value.clone())
                .map_or(Self::Custom(value), Self::Progress),
            event_type::TOOL_CALL => serde_json::from_value(value.clone())
                .map_or(Self::Custom(value), Self::ToolCall),
            event_type::TOOL_RESULT => serde_json::from_value(value.clone())
                .map_or(Self::Custom(value), Self::ToolResult),
            event_type::WORKFLOW_STEP => serde_json::from_value(value.clone())
                .map_or(Self::Custom(value), Self::WorkflowStep),
            event_type::MESSAGE => match value {
                Value::String(text) => Self::Text(text),
                other => Self::Custom(other),
            },
            event_type::AGENT_ERROR | event_type::TOOL_ERROR => Self::Error(value),
            _ => Self::Custom(value),
        }
    }
}

/// A typed, timestamped record published to the bus.
///
/// Events are immutable after publish; the bus clones them into each
/// matching subscription's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Dotted event type (`agent.start`, `tool.fetch.retry`, …).
    pub event_type: String,
    /// Id of the originating agent.
    pub agent_id: Uuid,
    /// Name of the originating agent.
    pub agent_name: String,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Typed payload.
    pub data: EventData,
    /// Free-form metadata, distinct from the payload.
    pub metadata: HashMap<String, Value>,
    /// Whether the event records a failure.
    pub is_error: bool,
}

impl Event {
    /// Create an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, identity: &AgentIdentity) -> Self {
        Self {
            event_type: event_type.into(),
            agent_id: identity.id,
            agent_name: identity.name.clone(),
            timestamp: Utc::now(),
            data: EventData::Empty,
            metadata: HashMap::new(),
            is_error: false,
        }
    }

    /// An agent-start event.
    #[must_use]
    pub fn agent_start(identity: &AgentIdentity) -> Self {
        Self::new(event_type::AGENT_START, identity)
            .with_metadata("agent_kind", Value::from(identity.kind.as_str()))
    }

    /// An agent-complete event.
    #[must_use]
    pub fn agent_complete(identity: &AgentIdentity) -> Self {
        Self::new(event_type::AGENT_COMPLETE, identity)
    }

    /// An agent-error event carrying the serialized error.
    #[must_use]
    pub fn agent_error(identity: &AgentIdentity, error: &AgentError) -> Self {
        let mut event = Self::new(event_type::AGENT_ERROR, identity);
        event.data = EventData::Error(error.to_json());
        event.is_error = true;
        event
    }

    /// A tool-call event.
    #[must_use]
    pub fn tool_call(identity: &AgentIdentity, data: ToolCallEventData) -> Self {
        let mut event = Self::new(event_type::TOOL_CALL, identity);
        event.data = EventData::ToolCall(data);
        event
    }

    /// A tool-result event.
    #[must_use]
    pub fn tool_result(identity: &AgentIdentity, data: ToolResultEventData) -> Self {
        let mut event = Self::new(event_type::TOOL_RESULT, identity);
        event.data = EventData::ToolResult(data);
        event
    }

    /// A tool-error event for a tool that exhausted its retries.
    #[must_use]
    pub fn tool_error(identity: &AgentIdentity, tool_name: &str, error: &AgentError) -> Self {
        let mut event = Self::new(event_type::TOOL_ERROR, identity);
        event.data = EventData::Error(error.to_json());
        event.is_error = true;
        event.with_metadata("tool_name", Value::from(tool_name))
    }

    /// A progress event.
    #[must_use]
    pub fn progress(identity: &AgentIdentity, data: ProgressEventData) -> Self {
        let mut event = Self::new(event_type::PROGRESS, identity);
        event.data = EventData::Progress(data);
        event
    }

    /// A message event.
    #[must_use]
    pub fn message(identity: &AgentIdentity, text: impl Into<String>) -> Self {
        let mut event = Self::new(event_type::MESSAGE, identity);
        event.data = EventData::Text(text.into());
        event
    }

    /// A workflow-step event.
    #[must_use]
    pub fn workflow_step(identity: &AgentIdentity, data: WorkflowStepEventData) -> Self {
        let mut event = Self::new(event_type::WORKFLOW_STEP, identity);
        event.data = EventData::WorkflowStep(data);
        event
    }

    /// A custom event under an arbitrary type.
    #[must_use]
    pub fn custom(event_type: impl Into<String>, identity: &AgentIdentity, data: Value) -> Self {
        let mut event = Self::new(event_type, identity);
        event.data = EventData::Custom(data);
        event
    }

    /// Attach a metadata entry, returning `self` for chaining.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use serde_json::json;

    fn identity() -> AgentIdentity {
        AgentIdentity::new("tester", AgentKind::Llm)
    }

    #[test]
    fn agent_error_sets_error_flag() {
        let err = AgentError::provider("boom");
        let event = Event::agent_error(&identity(), &err);
        assert!(event.is_error);
        assert_eq!(event.event_type, event_type::AGENT_ERROR);
        match &event.data {
            EventData::Error(v) => assert_eq!(v["code"], json!("agent.provider_error")),
            other => panic!("expected error payload, got {other:?}"),
        }
    }

    #[test]
    fn from_wire_reconstructs_progress() {
        let data = EventData::from_wire(
            event_type::PROGRESS,
            json!({"current": 3, "total": 10, "message": "working"}),
        );
        assert_eq!(
            data,
            EventData::Progress(ProgressEventData {
                current: 3,
                total: 10,
                message: "working".into(),
            })
        );
    }

    #[test]
    fn from_wire_unknown_type_is_custom() {
        let data = EventData::from_wire("tool.fetch.cache_hit", json!({"key": "k"}));
        assert_eq!(data, EventData::Custom(json!({"key": "k"})));
    }

    #[test]
    fn from_wire_null_is_empty() {
        assert_eq!(EventData::from_wire(event_type::AGENT_START, Value::Null), EventData::Empty);
    }

    #[test]
    fn metadata_is_distinct_from_payload() {
        let event = Event::message(&identity(), "hi").with_metadata("channel", json!("cli"));
        assert_eq!(event.data, EventData::Text("hi".into()));
        assert_eq!(event.metadata["channel"], json!("cli"));
    }
}
