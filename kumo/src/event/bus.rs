//! The event bus.
//!
//! Publishes are accepted from any task; delivery to each subscription is
//! serialized by a dedicated consumer task over a bounded queue, so a
//! handler is never re-entered concurrently and observes events in publish
//! order. Different subscriptions drain in parallel.
//!
//! When a queue is full the configured [`OverflowPolicy`] applies:
//! [`Backpressure`](OverflowPolicy::Backpressure) makes the publisher wait
//! for space, [`DropOldest`](OverflowPolicy::DropOldest) discards the
//! oldest queued event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::filter::EventFilter;
use super::pattern::EventPattern;
use super::Event;
use crate::error::Result;

/// Identifier of a subscription.
pub type SubscriptionId = Uuid;

/// What to do when a subscription's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Block the publisher until the consumer frees space.
    #[default]
    Backpressure,
    /// Discard the oldest queued event to admit the new one.
    DropOldest,
}

/// Bus configuration.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Per-subscription queue capacity.
    pub capacity: usize,
    /// Overflow policy applied to every subscription.
    pub policy: OverflowPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            policy: OverflowPolicy::Backpressure,
        }
    }
}

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been closed.
    #[error("event bus is closed")]
    Closed,
}

/// An event consumer.
///
/// Handlers returning an error are logged; delivery to other subscriptions
/// is unaffected.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event.
    async fn handle(&self, event: Event) -> Result<()>;
}

/// Adapter turning a synchronous closure into an [`EventHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Result<()> + Send + Sync,
{
    async fn handle(&self, event: Event) -> Result<()> {
        (self.0)(event)
    }
}

/// How a subscription selects events.
enum Selector {
    /// Predicate filter; `None` matches everything.
    Filter(Option<EventFilter>),
    /// Dot-segment glob over the event type.
    Pattern(EventPattern),
}

impl Selector {
    fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Filter(None) => true,
            Self::Filter(Some(filter)) => filter.matches(event),
            Self::Pattern(pattern) => pattern.matches(&event.event_type),
        }
    }

    /// Delivery rank: exact matches (and predicate filters) enqueue before
    /// pattern matches; among patterns, fewer wildcards enqueue first.
    fn rank(&self) -> usize {
        match self {
            Self::Filter(_) => 0,
            Self::Pattern(pattern) => {
                if pattern.is_exact() {
                    0
                } else {
                    pattern.wildcard_count()
                }
            }
        }
    }
}

/// The bounded queue backing one subscription.
struct SubQueue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    /// Free slots; consulted only under `Backpressure`.
    space: Semaphore,
    capacity: usize,
    policy: OverflowPolicy,
    shutdown: CancellationToken,
}

impl SubQueue {
    fn new(capacity: usize, policy: OverflowPolicy, shutdown: CancellationToken) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            space: Semaphore::new(capacity),
            capacity,
            policy,
            shutdown,
        }
    }

    async fn push(&self, event: Event, subscription: SubscriptionId) {
        match self.policy {
            OverflowPolicy::Backpressure => {
                let Ok(permit) = self.space.acquire().await else {
                    return; // semaphore closed alongside the bus
                };
                permit.forget();
                self.events
                    .lock()
                    .expect("event queue lock poisoned")
                    .push_back(event);
            }
            OverflowPolicy::DropOldest => {
                let mut queue = self.events.lock().expect("event queue lock poisoned");
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    debug!(%subscription, "Dropped oldest queued event");
                }
                queue.push_back(event);
            }
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Event> {
        self.events
            .lock()
            .expect("event queue lock poisoned")
            .pop_front()
    }

    fn release_slot(&self) {
        if self.policy == OverflowPolicy::Backpressure {
            self.space.add_permits(1);
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    selector: Selector,
    queue: Arc<SubQueue>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

struct BusInner {
    subscriptions: RwLock<Vec<Subscription>>,
    config: BusConfig,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

/// A pub/sub event bus with pattern routing and per-subscription FIFO.
///
/// Cloning is cheap and shares the underlying bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.config.capacity)
            .field("policy", &self.inner.config.policy)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with an explicit configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(Vec::new()),
                config,
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe with an optional predicate filter.
    pub async fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        self.add_subscription(Selector::Filter(filter), handler).await
    }

    /// Subscribe with a synchronous closure and an optional filter.
    pub async fn subscribe_fn<F>(&self, filter: Option<EventFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnHandler(handler)), filter).await
    }

    /// Subscribe to event types matching a dot-segment glob pattern.
    pub async fn subscribe_pattern(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        self.add_subscription(Selector::Pattern(EventPattern::new(pattern.into())), handler)
            .await
    }

    /// Subscribe to a pattern with a synchronous closure.
    pub async fn subscribe_pattern_fn<F>(
        &self,
        pattern: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_pattern(pattern, Arc::new(FnHandler(handler)))
            .await
    }

    async fn add_subscription(
        &self,
        selector: Selector,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        let shutdown = self.inner.shutdown.child_token();
        let queue = Arc::new(SubQueue::new(
            self.inner.config.capacity,
            self.inner.config.policy,
            shutdown.clone(),
        ));

        let task = tokio::spawn(consume(id, Arc::clone(&queue), handler));

        self.inner.subscriptions.write().await.push(Subscription {
            id,
            selector,
            queue,
            shutdown,
            task: Some(task),
        });
        id
    }

    /// Remove a subscription, waiting for its queued events to drain.
    ///
    /// Returns `false` when the id is unknown.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subs = self.inner.subscriptions.write().await;
            subs.iter()
                .position(|s| s.id == id)
                .map(|index| subs.remove(index))
        };
        match removed {
            Some(mut sub) => {
                sub.shutdown.cancel();
                if let Some(task) = sub.task.take() {
                    let _ = task.await;
                }
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every matching subscription.
    ///
    /// Enqueue order across subscriptions: exact type matches first, then
    /// patterns by ascending wildcard count, subscription order within a
    /// rank. Delivery itself is asynchronous; this method returns once the
    /// event is queued everywhere (which may wait under backpressure).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close).
    pub async fn publish(&self, event: Event) -> std::result::Result<(), BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        // Snapshot matching queues under the read lock, then enqueue
        // without holding it so (un)subscribe is never blocked behind
        // a backpressured publisher.
        let mut targets: Vec<(usize, SubscriptionId, Arc<SubQueue>)> = {
            let subs = self.inner.subscriptions.read().await;
            subs.iter()
                .filter(|s| s.selector.matches(&event))
                .map(|s| (s.selector.rank(), s.id, Arc::clone(&s.queue)))
                .collect()
        };
        targets.sort_by_key(|(rank, _, _)| *rank);

        for (_, id, queue) in targets {
            queue.push(event.clone(), id).await;
        }
        Ok(())
    }

    /// Gracefully shut down: refuse further publishes, then drain every
    /// subscription's queued events and join the consumer tasks.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut subs = {
            let mut table = self.inner.subscriptions.write().await;
            std::mem::take(&mut *table)
        };
        self.inner.shutdown.cancel();
        for sub in &mut subs {
            if let Some(task) = sub.task.take() {
                let _ = task.await;
            }
        }
    }

    /// Number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().await.len()
    }
}

/// Consumer loop for one subscription: pop, handle, repeat. On shutdown the
/// remaining queued events are drained before exiting.
async fn consume(id: SubscriptionId, queue: Arc<SubQueue>, handler: Arc<dyn EventHandler>) {
    loop {
        match queue.pop() {
            Some(event) => {
                let event_type = event.event_type.clone();
                if let Err(error) = handler.handle(event).await {
                    warn!(subscription = %id, event_type, %error, "Event handler failed");
                }
                queue.release_slot();
            }
            None => {
                if queue.shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    () = queue.notify.notified() => {}
                    () = queue.shutdown.cancelled() => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::{AgentIdentity, AgentKind};
    use crate::error::AgentError;
    use std::time::Duration;

    fn identity() -> AgentIdentity {
        AgentIdentity::new("bus_tester", AgentKind::Llm)
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(Event) -> Result<()>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |event: Event| {
            sink.lock().unwrap().push(event.event_type);
            Ok(())
        };
        (seen, handler)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn delivers_to_matching_filter() {
        let bus = EventBus::new();
        let (seen, handler) = collector();
        bus.subscribe_fn(Some(EventFilter::types(["agent.start"])), handler)
            .await;

        let id = identity();
        bus.publish(Event::agent_start(&id)).await.unwrap();
        bus.publish(Event::agent_complete(&id)).await.unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec!["agent.start".to_string()]);
        bus.close().await;
    }

    #[tokio::test]
    async fn fifo_per_subscription() {
        let bus = EventBus::new();
        let (seen, handler) = collector();
        bus.subscribe_fn(None, handler).await;

        let id = identity();
        for i in 0..20 {
            bus.publish(Event::custom(format!("seq.{i}"), &id, serde_json::Value::Null))
                .await
                .unwrap();
        }
        bus.close().await;

        let seen = seen.lock().unwrap();
        let expected: Vec<String> = (0..20).map(|i| format!("seq.{i}")).collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test]
    async fn pattern_subscription_matches_namespace() {
        let bus = EventBus::new();
        let (seen, handler) = collector();
        bus.subscribe_pattern_fn("tool.**", handler).await;

        let id = identity();
        bus.publish(Event::custom("tool.fetch.cache_hit", &id, serde_json::Value::Null))
            .await
            .unwrap();
        bus.publish(Event::agent_start(&id)).await.unwrap();
        bus.close().await;

        assert_eq!(*seen.lock().unwrap(), vec!["tool.fetch.cache_hit".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (seen, handler) = collector();
        let sub = bus.subscribe_fn(None, handler).await;

        let id = identity();
        bus.publish(Event::agent_start(&id)).await.unwrap();
        assert!(bus.unsubscribe(sub).await);
        bus.publish(Event::agent_complete(&id)).await.unwrap();
        bus.close().await;

        assert_eq!(*seen.lock().unwrap(), vec!["agent.start".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_id_is_false() {
        let bus = EventBus::new();
        assert!(!bus.unsubscribe(Uuid::new_v4()).await);
        bus.close().await;
    }

    #[tokio::test]
    async fn close_rejects_further_publishes() {
        let bus = EventBus::new();
        bus.close().await;
        let err = bus.publish(Event::agent_start(&identity())).await;
        assert!(matches!(err, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn close_drains_queued_events() {
        let bus = EventBus::new();
        let (seen, handler) = collector();
        bus.subscribe_fn(None, handler).await;

        let id = identity();
        for _ in 0..10 {
            bus.publish(Event::agent_start(&id)).await.unwrap();
        }
        bus.close().await;
        assert_eq!(seen.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn handler_errors_do_not_affect_other_subscribers() {
        let bus = EventBus::new();
        bus.subscribe_fn(None, |_| Err(AgentError::internal("handler bug")))
            .await;
        let (seen, handler) = collector();
        bus.subscribe_fn(None, handler).await;

        bus.publish(Event::agent_start(&identity())).await.unwrap();
        bus.close().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drop_oldest_discards_from_the_front() {
        let bus = EventBus::with_config(BusConfig {
            capacity: 2,
            policy: OverflowPolicy::DropOldest,
        });
        // A handler gated on a zero-permit semaphore, so the queue fills
        // while the first event is being "processed".
        let gate = Arc::new(Semaphore::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        struct Gated {
            gate: Arc<Semaphore>,
            sink: Arc<Mutex<Vec<String>>>,
        }
        #[async_trait]
        impl EventHandler for Gated {
            async fn handle(&self, event: Event) -> Result<()> {
                let permit = self.gate.acquire().await.expect("gate closed");
                permit.forget();
                self.sink.lock().unwrap().push(event.event_type);
                Ok(())
            }
        }
        bus.subscribe(
            Arc::new(Gated {
                gate: Arc::clone(&gate),
                sink: Arc::clone(&seen),
            }),
            None,
        )
        .await;

        let id = identity();
        // First event is picked up by the consumer and blocks; the next
        // three overflow a capacity-2 queue, dropping "seq.1".
        for i in 0..4 {
            bus.publish(Event::custom(format!("seq.{i}"), &id, serde_json::Value::Null))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
        gate.add_permits(4);
        bus.close().await;

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&"seq.0".to_string()));
        assert!(seen.contains(&"seq.3".to_string()));
        assert!(!seen.contains(&"seq.1".to_string()));
    }
}
