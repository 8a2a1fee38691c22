//! tkd-bus
//!
//! Typed, in-process, asynchronous pub/sub.
//!
//! A typed bus lets components be tested in isolation and makes the pipeline
//! topology a runtime fact instead of a call graph.  Contract:
//!
//! - Handlers for one `publish` run concurrently relative to each other; the
//!   publisher is released when all of them have completed or failed.
//! - A failing handler is logged with the event id and never affects its
//!   siblings or subsequent publishes.
//! - Delivery order per subscriber follows the order of `publish` calls.
//!   Nothing is ordered *across* subscribers of the same publish.
//! - No redelivery, no persistence, no backpressure.
//! - History is bounded (last 1000 events, FIFO eviction) and lossy; reading
//!   it never blocks publishing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use tkd_schemas::{Event, EventKind, EventPayload};

/// Bounded event history depth.
pub const HISTORY_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// A bus subscriber.
///
/// `name()` is the subscriber's identity: `subscribe` is idempotent per
/// `(kind, name)` pair and `unsubscribe` removes by name.  Handlers receive
/// events by reference and must not assume exclusive access to anything but
/// their own state.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable identity of this subscriber.
    fn name(&self) -> &str;

    /// Process one event.  An `Err` is captured and logged by the bus; it is
    /// never propagated to sibling handlers or the publisher.
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

struct Registration {
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// The event bus.  Cheap to share via `Arc`; all methods take `&self`.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    history: Mutex<VecDeque<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.  Re-registering the same subscriber
    /// name for the same kind is a no-op.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut subs = self.subscribers.write();
        let regs = subs.entry(kind).or_default();
        if regs.iter().any(|r| r.name == handler.name()) {
            return;
        }
        regs.push(Registration {
            name: handler.name().to_string(),
            handler,
        });
    }

    /// Remove the subscriber registered under `name` for `kind`.  Unknown
    /// pairs are a no-op.
    pub fn unsubscribe(&self, kind: EventKind, name: &str) {
        let mut subs = self.subscribers.write();
        if let Some(regs) = subs.get_mut(&kind) {
            regs.retain(|r| r.name != name);
        }
    }

    /// Number of subscribers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler subscribed to its kind.
    ///
    /// The subscriber list is snapshotted under the lock and the lock is
    /// released before any handler runs, so handlers may freely publish
    /// nested events or (un)subscribe.
    pub async fn publish(&self, event: Event) {
        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let handlers: Vec<(String, Arc<dyn EventHandler>)> = {
            let subs = self.subscribers.read();
            subs.get(&event.kind())
                .map(|regs| {
                    regs.iter()
                        .map(|r| (r.name.clone(), Arc::clone(&r.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let event_ref = &event;
        join_all(handlers.iter().map(|(name, handler)| async move {
            if let Err(err) = handler.handle(event_ref).await {
                warn!(
                    event_id = %event_ref.event_id,
                    kind = %event_ref.kind(),
                    subscriber = %name,
                    error = %err,
                    "event handler failed"
                );
            }
        }))
        .await;
    }

    /// Wrap `payload` in a fresh envelope and publish it.
    pub async fn publish_payload(&self, payload: EventPayload) {
        self.publish(Event::now(payload)).await;
    }

    /// The last [`HISTORY_CAPACITY`] events in publish order.
    pub fn history(&self) -> Vec<Event> {
        self.history.lock().iter().cloned().collect()
    }

    /// History filtered to one kind, in publish order.
    pub fn history_of(&self, kind: EventKind) -> Vec<Event> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use tkd_schemas::{Micros, Tick};

    struct Counter {
        name: &'static str,
        seen: AtomicUsize,
    }

    impl Counter {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.seen.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for Counter {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tick_event(symbol: &str) -> Event {
        Event::now(EventPayload::Tick(Tick {
            symbol: symbol.to_string(),
            last: Micros::from_units(100),
            bid: Micros::ZERO,
            ask: Micros::ZERO,
            volume: 1,
            ts: Utc::now(),
        }))
    }

    #[tokio::test]
    async fn delivers_to_subscriber_of_matching_kind() {
        let bus = EventBus::new();
        let counter = Counter::new("c");
        bus.subscribe(EventKind::Tick, counter.clone());

        bus.publish(tick_event("ACME")).await;
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn does_not_deliver_other_kinds() {
        let bus = EventBus::new();
        let counter = Counter::new("c");
        bus.subscribe(EventKind::Fill, counter.clone());

        bus.publish(tick_event("ACME")).await;
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_name() {
        let bus = EventBus::new();
        let counter = Counter::new("c");
        bus.subscribe(EventKind::Tick, counter.clone());
        bus.subscribe(EventKind::Tick, counter.clone());
        assert_eq!(bus.subscriber_count(EventKind::Tick), 1);

        bus.publish(tick_event("ACME")).await;
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_then_publish_delivers_nothing() {
        let bus = EventBus::new();
        let counter = Counter::new("c");
        bus.subscribe(EventKind::Tick, counter.clone());
        bus.unsubscribe(EventKind::Tick, "c");

        bus.publish(tick_event("ACME")).await;
        assert_eq!(counter.count(), 0);
        assert_eq!(bus.subscriber_count(EventKind::Tick), 0);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_pair_is_noop() {
        let bus = EventBus::new();
        bus.unsubscribe(EventKind::Tick, "nobody");
        assert_eq!(bus.subscriber_count(EventKind::Tick), 0);
    }

    #[tokio::test]
    async fn history_preserves_publish_order() {
        let bus = EventBus::new();
        for sym in ["A", "B", "C"] {
            bus.publish(tick_event(sym)).await;
        }

        let hist = bus.history();
        assert_eq!(hist.len(), 3);
        let syms: Vec<String> = hist
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Tick(t) => t.symbol.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(syms, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn history_evicts_fifo_at_capacity() {
        let bus = EventBus::new();
        for i in 0..(HISTORY_CAPACITY + 10) {
            bus.publish(tick_event(&format!("S{i}"))).await;
        }

        let hist = bus.history();
        assert_eq!(hist.len(), HISTORY_CAPACITY);
        match &hist[0].payload {
            EventPayload::Tick(t) => assert_eq!(t.symbol, "S10"),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
