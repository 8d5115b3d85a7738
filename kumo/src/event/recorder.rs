//! Recording events from a bus into storage.

use std::sync::Arc;

use async_trait::async_trait;

use super::bus::{EventBus, EventHandler, SubscriptionId};
use super::filter::EventFilter;
use super::storage::EventStorage;
use super::Event;
use crate::error::Result;

/// Copies every matching bus event into an [`EventStorage`].
///
/// The recorder is an ordinary subscriber: it inherits the bus's FIFO
/// guarantee, so storage order follows publish order for the events it
/// sees.
#[derive(Debug)]
pub struct EventRecorder {
    storage: Arc<dyn EventStorage>,
    subscription: SubscriptionId,
}

struct RecordingHandler {
    storage: Arc<dyn EventStorage>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: Event) -> Result<()> {
        self.storage.append(event).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RecordingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandler").finish_non_exhaustive()
    }
}

impl EventRecorder {
    /// Subscribe to `bus` and record matching events into `storage`.
    /// `filter = None` records everything.
    pub async fn attach(
        bus: &EventBus,
        storage: Arc<dyn EventStorage>,
        filter: Option<EventFilter>,
    ) -> Self {
        let handler = Arc::new(RecordingHandler {
            storage: Arc::clone(&storage),
        });
        let subscription = bus.subscribe(handler, filter).await;
        Self {
            storage,
            subscription,
        }
    }

    /// The storage this recorder writes to.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn EventStorage> {
        Arc::clone(&self.storage)
    }

    /// Stop recording, draining any queued events first.
    pub async fn detach(self, bus: &EventBus) {
        bus.unsubscribe(self.subscription).await;
    }
}

impl std::fmt::Debug for dyn EventStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStorage").finish_non_exhaustive()
    }
}
