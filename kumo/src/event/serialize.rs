//! Event serialization.
//!
//! Every event serializes to the canonical wire form:
//!
//! ```json
//! {
//!   "type": "tool.result",
//!   "agent_id": "…",
//!   "agent_name": "…",
//!   "timestamp": "2026-01-01T00:00:00.000000Z",
//!   "data": { … },
//!   "metadata": { … },
//!   "is_error": false
//! }
//! ```
//!
//! Bridge events carry `bridge_id` and `session_id` at the top level; they
//! are hoisted out of the metadata map on serialization and restored into
//! it on deserialization. Deserialization reconstructs the typed payload
//! from the `type` field.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Event, EventData};
use crate::error::{AgentError, Result};

/// Metadata keys hoisted to the top level of the wire form.
const TOP_LEVEL_KEYS: [&str; 2] = ["bridge_id", "session_id"];

/// Render an event as the canonical wire JSON value.
#[must_use]
pub fn to_wire(event: &Event) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), Value::String(event.event_type.clone()));
    object.insert("agent_id".into(), Value::String(event.agent_id.to_string()));
    object.insert("agent_name".into(), Value::String(event.agent_name.clone()));
    object.insert(
        "timestamp".into(),
        Value::String(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    object.insert("data".into(), event.data.to_value());

    let mut metadata = Map::new();
    for (key, value) in &event.metadata {
        if TOP_LEVEL_KEYS.contains(&key.as_str()) {
            object.insert(key.clone(), value.clone());
        } else {
            metadata.insert(key.clone(), value.clone());
        }
    }
    object.insert("metadata".into(), Value::Object(metadata));
    object.insert("is_error".into(), Value::Bool(event.is_error));
    Value::Object(object)
}

/// Reconstruct an event from the canonical wire JSON value.
///
/// # Errors
///
/// Returns an internal error when required fields are missing or malformed.
pub fn from_wire(value: &Value) -> Result<Event> {
    let object = value
        .as_object()
        .ok_or_else(|| AgentError::internal("event wire form must be an object"))?;

    let field = |name: &str| -> Result<&str> {
        object
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::internal(format!("event wire form missing '{name}'")))
    };

    let event_type = field("type")?.to_string();
    let agent_id = Uuid::parse_str(field("agent_id")?)
        .map_err(|e| AgentError::internal(format!("bad agent_id: {e}")))?;
    let agent_name = field("agent_name")?.to_string();
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(field("timestamp")?)
        .map_err(|e| AgentError::internal(format!("bad timestamp: {e}")))?
        .with_timezone(&Utc);

    let data = EventData::from_wire(
        &event_type,
        object.get("data").cloned().unwrap_or(Value::Null),
    );

    let mut metadata = std::collections::HashMap::new();
    if let Some(Value::Object(map)) = object.get("metadata") {
        for (key, value) in map {
            metadata.insert(key.clone(), value.clone());
        }
    }
    for key in TOP_LEVEL_KEYS {
        if let Some(value) = object.get(key) {
            metadata.insert(key.to_string(), value.clone());
        }
    }

    Ok(Event {
        event_type,
        agent_id,
        agent_name,
        timestamp,
        data,
        metadata,
        is_error: object
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// A reversible text encoding of events.
pub trait EventSerializer: Send + Sync {
    /// Name of the encoding.
    fn name(&self) -> &'static str;

    /// Encode one event.
    ///
    /// # Errors
    ///
    /// Returns an error when the event cannot be encoded.
    fn serialize(&self, event: &Event) -> Result<String>;

    /// Decode one event.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a valid encoding.
    fn deserialize(&self, text: &str) -> Result<Event>;
}

/// Terse single-line pipe-delimited encoding, for log shipping.
///
/// Layout: `timestamp|type|agent_id|agent_name|is_error|data|metadata`,
/// with the two trailing fields JSON-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactSerializer;

impl EventSerializer for CompactSerializer {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn serialize(&self, event: &Event) -> Result<String> {
        let wire = to_wire(event);
        let data = serde_json::to_string(&wire["data"])?;
        let metadata = serde_json::to_string(&wire["metadata"])?;
        Ok(format!(
            "{}|{}|{}|{}|{}|{}|{}",
            wire["timestamp"].as_str().unwrap_or_default(),
            event.event_type,
            event.agent_id,
            event.agent_name,
            event.is_error,
            data,
            metadata,
        ))
    }

    fn deserialize(&self, text: &str) -> Result<Event> {
        let mut parts = text.splitn(7, '|');
        let mut next = |name: &str| -> Result<&str> {
            parts
                .next()
                .ok_or_else(|| AgentError::internal(format!("compact event missing '{name}'")))
        };
        let timestamp = next("timestamp")?;
        let event_type = next("type")?;
        let agent_id = next("agent_id")?;
        let agent_name = next("agent_name")?;
        let is_error = next("is_error")?;
        let data: Value = serde_json::from_str(next("data")?)?;
        let metadata: Value = serde_json::from_str(next("metadata")?)?;

        from_wire(&serde_json::json!({
            "type": event_type,
            "agent_id": agent_id,
            "agent_name": agent_name,
            "timestamp": timestamp,
            "data": data,
            "metadata": metadata,
            "is_error": is_error == "true",
        }))
    }
}

/// Human-readable indented JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettySerializer;

impl EventSerializer for PrettySerializer {
    fn name(&self) -> &'static str {
        "pretty"
    }

    fn serialize(&self, event: &Event) -> Result<String> {
        Ok(serde_json::to_string_pretty(&to_wire(event))?)
    }

    fn deserialize(&self, text: &str) -> Result<Event> {
        from_wire(&serde_json::from_str(text)?)
    }
}

/// Minified JSON encoding, for cross-process transmission.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJsonSerializer;

impl EventSerializer for CompactJsonSerializer {
    fn name(&self) -> &'static str {
        "compact-json"
    }

    fn serialize(&self, event: &Event) -> Result<String> {
        Ok(serde_json::to_string(&to_wire(event))?)
    }

    fn deserialize(&self, text: &str) -> Result<Event> {
        from_wire(&serde_json::from_str(text)?)
    }
}
