//! Event storage for recording and replay.
//!
//! [`EventStorage`] is the pluggable persistence interface; the in-memory
//! default is append-only with monotonic sequence numbers. Queries return
//! events ordered by original timestamp, ties broken by sequence number,
//! the order replay delivers them in.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Event;
use crate::error::Result;

/// An event with its storage sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Monotonic per-storage sequence, assigned at append time.
    pub sequence: u64,
    /// The recorded event.
    pub event: Event,
}

/// Selection criteria for reading stored events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Only events at or after this instant.
    pub start_time: Option<DateTime<Utc>>,
    /// Only events at or before this instant.
    pub end_time: Option<DateTime<Utc>>,
    /// Only events of these types.
    pub types: Option<Vec<String>>,
    /// Only events from these agents.
    pub agent_ids: Option<Vec<Uuid>>,
    /// Cap on the number of returned events.
    pub limit: Option<usize>,
}

impl EventQuery {
    /// A query matching everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a time window.
    #[must_use]
    pub const fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Restrict to the given event types.
    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given agents.
    #[must_use]
    pub fn with_agents(mut self, ids: Vec<Uuid>) -> Self {
        self.agent_ids = Some(ids);
        self
    }

    /// Cap the result count.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        self.start_time.is_none_or(|t| event.timestamp >= t)
            && self.end_time.is_none_or(|t| event.timestamp <= t)
            && self
                .types
                .as_ref()
                .is_none_or(|types| types.iter().any(|t| *t == event.event_type))
            && self
                .agent_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&event.agent_id))
    }
}

/// Pluggable event persistence.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Append an event, returning its sequence number.
    async fn append(&self, event: Event) -> Result<u64>;

    /// Read events matching the query, ordered by `(timestamp, sequence)`.
    async fn query(&self, query: &EventQuery) -> Result<Vec<StoredEvent>>;

    /// Number of stored events.
    async fn count(&self) -> usize;

    /// Remove all stored events. Sequence numbers keep advancing.
    async fn clear(&self);
}

/// The default append-only in-memory storage.
#[derive(Debug, Default)]
pub struct InMemoryEventStorage {
    events: RwLock<Vec<StoredEvent>>,
    next_sequence: AtomicU64,
}

impl InMemoryEventStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    async fn append(&self, event: Event) -> Result<u64> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.events
            .write()
            .await
            .push(StoredEvent { sequence, event });
        Ok(sequence)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<StoredEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<StoredEvent> = events
            .iter()
            .filter(|stored| query.matches(&stored.event))
            .cloned()
            .collect();
        matched.sort_by_key(|stored| (stored.event.timestamp, stored.sequence));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    async fn clear(&self) {
        self.events.write().await.clear();
    }
}
