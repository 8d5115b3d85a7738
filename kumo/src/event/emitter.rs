//! Event emission handles for agents and tools.

use serde_json::Value;
use tracing::debug;

use super::bus::EventBus;
use super::{Event, EventData, ProgressEventData};
use crate::agent::AgentIdentity;
use crate::error::AgentError;

/// A handle through which agents and tools emit events.
///
/// An emitter without a dispatcher swallows events, so agents run fine
/// with no bus attached. Tool-scoped emitters (built via
/// [`EventEmitter::for_tool`]) publish custom events under the
/// `tool.<tool_name>.<suffix>` namespace.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    bus: Option<EventBus>,
    identity: AgentIdentity,
    tool_name: Option<String>,
}

impl EventEmitter {
    /// Create an emitter for an agent.
    #[must_use]
    pub fn new(bus: Option<EventBus>, identity: AgentIdentity) -> Self {
        Self {
            bus,
            identity,
            tool_name: None,
        }
    }

    /// Scope this emitter to a tool, namespacing its custom events.
    #[must_use]
    pub fn for_tool(&self, tool_name: impl Into<String>) -> Self {
        Self {
            bus: self.bus.clone(),
            identity: self.identity.clone(),
            tool_name: Some(tool_name.into()),
        }
    }

    /// The identity events are attributed to.
    #[must_use]
    pub const fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Whether a dispatcher is attached.
    #[must_use]
    pub const fn has_dispatcher(&self) -> bool {
        self.bus.is_some()
    }

    /// Publish an already-built event.
    pub async fn emit(&self, event: Event) {
        if let Some(bus) = &self.bus {
            if let Err(error) = bus.publish(event).await {
                debug!(%error, "Dropped event: bus unavailable");
            }
        }
    }

    /// Emit a progress event. Tool-scoped emitters publish under
    /// `tool.<tool_name>.progress`, agent emitters under `progress`.
    pub async fn emit_progress(&self, current: u64, total: u64, message: impl Into<String>) {
        let data = ProgressEventData {
            current,
            total,
            message: message.into(),
        };
        let event = match &self.tool_name {
            Some(tool) => {
                let mut event = Event::new(format!("tool.{tool}.progress"), &self.identity);
                event.data = EventData::Progress(data);
                event
            }
            None => Event::progress(&self.identity, data),
        };
        self.emit(event).await;
    }

    /// Emit a message event. Tool-scoped emitters publish under
    /// `tool.<tool_name>.message`, agent emitters under `message`.
    pub async fn emit_message(&self, message: impl Into<String>) {
        let event = match &self.tool_name {
            Some(tool) => {
                let mut event = Event::new(format!("tool.{tool}.message"), &self.identity);
                event.data = EventData::Text(message.into());
                event
            }
            None => Event::message(&self.identity, message),
        };
        self.emit(event).await;
    }

    /// Emit an error event. Tool-scoped emitters report under
    /// `tool.<tool_name>.error`, agent emitters under `agent.error`.
    pub async fn emit_error(&self, error: &AgentError) {
        let event = match &self.tool_name {
            Some(tool) => {
                let mut event = Event::new(format!("tool.{tool}.error"), &self.identity);
                event.data = EventData::Error(error.to_json());
                event.is_error = true;
                event
            }
            None => Event::agent_error(&self.identity, error),
        };
        self.emit(event).await;
    }

    /// Emit a custom event. Tool-scoped emitters publish under
    /// `tool.<tool_name>.<name>`; agent emitters use `name` verbatim.
    pub async fn emit_custom(&self, name: &str, data: Value) {
        let event_type = match &self.tool_name {
            Some(tool) => format!("tool.{tool}.{name}"),
            None => name.to_string(),
        };
        self.emit(Event::custom(event_type, &self.identity, data))
            .await;
    }

    /// Emit the workflow-step event for a composite advancing to a child.
    pub async fn emit_workflow_step(&self, step_name: &str, step_index: usize, total_steps: usize) {
        self.emit(Event::workflow_step(
            &self.identity,
            super::WorkflowStepEventData {
                step_name: step_name.to_string(),
                step_index,
                total_steps,
            },
        ))
        .await;
    }
}
