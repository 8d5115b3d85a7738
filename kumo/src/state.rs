//! Execution state threaded through agent runs.
//!
//! [`State`] is the mutable data structure an agent owns while it executes:
//! a primary key/value store, a set of [`Artifact`]s, the ordered message
//! history, and a metadata map kept separate from the primary store.
//!
//! Cloning copies the four top-level containers. Artifact payloads are
//! [`Bytes`], so clones share payload storage; workflow composites clone
//! state before fanning out to parallel children and values should be
//! treated as copy-on-write.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use crate::message::Message;

/// A binary or textual payload attached to a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Identifier, unique within one state.
    pub id: String,
    /// Raw payload. Cheap to clone; clones share storage.
    pub content: Bytes,
    /// MIME content type.
    pub content_type: String,
}

impl Artifact {
    /// Create an artifact from raw bytes.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    /// Create a `text/plain` artifact from a string.
    #[must_use]
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Bytes::from(content.into()), "text/plain")
    }

    /// The payload as UTF-8 text, when valid.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// The shared mutable state of an agent run.
#[derive(Debug, Clone, Default)]
pub struct State {
    kv: HashMap<String, Value>,
    artifacts: HashMap<String, Artifact>,
    messages: Vec<Message>,
    metadata: HashMap<String, Value>,
}

impl State {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- primary key/value store ---

    /// Get a value from the primary store.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kv.get(key)
    }

    /// Insert a value into the primary store, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.kv.insert(key.into(), value);
    }

    /// Remove a value from the primary store.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.kv.remove(key)
    }

    /// The full primary store.
    #[must_use]
    pub const fn kv(&self) -> &HashMap<String, Value> {
        &self.kv
    }

    /// Mutable access to the primary store.
    pub const fn kv_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.kv
    }

    // --- artifacts ---

    /// Attach an artifact. An artifact with the same id is replaced.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.id.clone(), artifact);
    }

    /// Look up an artifact by id.
    #[must_use]
    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// All artifacts, keyed by id.
    #[must_use]
    pub const fn artifacts(&self) -> &HashMap<String, Artifact> {
        &self.artifacts
    }

    /// Mutable access to the artifact set.
    pub const fn artifacts_mut(&mut self) -> &mut HashMap<String, Artifact> {
        &mut self.artifacts
    }

    // --- messages ---

    /// Append a message to the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The ordered message history.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Mutable access to the message history.
    pub const fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    // --- metadata ---

    /// Get a metadata value.
    #[must_use]
    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Insert a metadata value.
    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Remove a metadata value.
    pub fn remove_meta(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// The full metadata map.
    #[must_use]
    pub const fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Mutable access to the metadata map.
    pub const fn metadata_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.metadata
    }
}

/// A read-only view of a [`State`], handed to tools.
///
/// The view is a snapshot taken when the tool invocation starts; tools
/// observe the state as it was at dispatch time and communicate results
/// through their return value, never by mutating state directly.
#[derive(Debug, Clone)]
pub struct StateView {
    snapshot: State,
}

impl StateView {
    /// Snapshot the given state.
    #[must_use]
    pub fn snapshot(state: &State) -> Self {
        Self {
            snapshot: state.clone(),
        }
    }

    /// Get a value from the primary store.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.get(key)
    }

    /// Look up an artifact by id.
    #[must_use]
    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.snapshot.artifact(id)
    }

    /// The ordered message history.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.snapshot.messages()
    }

    /// Get a metadata value.
    #[must_use]
    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.snapshot.get_meta(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod kv {
        use super::*;

        #[test]
        fn set_and_get() {
            let mut state = State::new();
            state.set("a", json!(1));
            assert_eq!(state.get("a"), Some(&json!(1)));
        }

        #[test]
        fn set_overwrites() {
            let mut state = State::new();
            state.set("a", json!(1));
            state.set("a", json!(2));
            assert_eq!(state.get("a"), Some(&json!(2)));
        }

        #[test]
        fn remove_returns_value() {
            let mut state = State::new();
            state.set("a", json!("x"));
            assert_eq!(state.remove("a"), Some(json!("x")));
            assert!(state.get("a").is_none());
        }
    }

    mod artifacts {
        use super::*;

        #[test]
        fn text_artifact_round_trips() {
            let mut state = State::new();
            state.add_artifact(Artifact::text("report", "hello"));
            let artifact = state.artifact("report").unwrap();
            assert_eq!(artifact.as_text(), Some("hello"));
            assert_eq!(artifact.content_type, "text/plain");
        }

        #[test]
        fn same_id_replaces() {
            let mut state = State::new();
            state.add_artifact(Artifact::text("a", "one"));
            state.add_artifact(Artifact::text("a", "two"));
            assert_eq!(state.artifacts().len(), 1);
            assert_eq!(state.artifact("a").unwrap().as_text(), Some("two"));
        }
    }

    mod cloning {
        use super::*;

        #[test]
        fn clone_is_isolated() {
            let mut original = State::new();
            original.set("k", json!("original"));
            original.add_message(Message::user("hi"));

            let mut cloned = original.clone();
            cloned.set("k", json!("mutated"));
            cloned.add_message(Message::assistant("hello"));

            assert_eq!(original.get("k"), Some(&json!("original")));
            assert_eq!(original.messages().len(), 1);
            assert_eq!(cloned.messages().len(), 2);
        }

        #[test]
        fn clone_preserves_message_order() {
            let mut state = State::new();
            state.add_message(Message::system("s"));
            state.add_message(Message::user("u"));
            state.add_message(Message::assistant("a"));

            let cloned = state.clone();
            let roles: Vec<&str> = cloned.messages().iter().map(|m| m.role.as_str()).collect();
            assert_eq!(roles, ["system", "user", "assistant"]);
        }

        #[test]
        fn artifact_payloads_share_storage() {
            let mut state = State::new();
            state.add_artifact(Artifact::text("big", "payload"));
            let cloned = state.clone();
            let a = &state.artifact("big").unwrap().content;
            let b = &cloned.artifact("big").unwrap().content;
            // Bytes clones share the same backing allocation.
            assert_eq!(a.as_ptr(), b.as_ptr());
        }
    }

    mod view {
        use super::*;

        #[test]
        fn view_is_a_snapshot() {
            let mut state = State::new();
            state.set("k", json!(1));
            let view = StateView::snapshot(&state);
            state.set("k", json!(2));
            assert_eq!(view.get("k"), Some(&json!(1)));
        }
    }
}
