//! Strategy engine service.
//!
//! Subscribes to `TICK`.  Each tick is dispatched to every registered
//! strategy whose symbol set contains the tick's symbol; the strategies run
//! to completion before the engine publishes their signals, so per-strategy
//! ordering matches tick arrival.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use tkd_bus::{EventBus, EventHandler};
use tkd_schemas::{Event, EventPayload, Signal};

use crate::Strategy;

pub struct StrategyEngine {
    bus: Arc<EventBus>,
    strategies: Mutex<Vec<Box<dyn Strategy>>>,
}

impl StrategyEngine {
    pub fn new(bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            strategies: Mutex::new(Vec::new()),
        })
    }

    pub fn register(&self, strategy: Box<dyn Strategy>) {
        debug!(strategy = strategy.id(), "registering strategy");
        self.strategies.lock().push(strategy);
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.lock().len()
    }

    /// Clear every strategy's rolling state (test isolation).
    pub fn reset_all(&self) {
        for strategy in self.strategies.lock().iter_mut() {
            strategy.reset();
        }
    }
}

#[async_trait]
impl EventHandler for StrategyEngine {
    fn name(&self) -> &str {
        "strategy-engine"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let EventPayload::Tick(tick) = &event.payload else {
            return Ok(());
        };

        // Run strategies to completion under the lock, publish after.
        let signals: Vec<Signal> = {
            let mut strategies = self.strategies.lock();
            strategies
                .iter_mut()
                .filter(|s| s.symbols().contains(&tick.symbol))
                .filter_map(|s| s.on_tick(tick))
                .collect()
        };

        for signal in signals {
            self.bus
                .publish_payload(EventPayload::Signal(signal))
                .await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tkd_schemas::{EventKind, Micros, Side, Tick};

    use crate::{MeanReversion, MeanReversionConfig};

    fn tick(symbol: &str, last_units: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            last: Micros::from_units(last_units),
            bid: Micros::ZERO,
            ask: Micros::ZERO,
            volume: 1,
            ts: Utc::now(),
        }
    }

    fn wire() -> (Arc<EventBus>, Arc<StrategyEngine>) {
        let bus = Arc::new(EventBus::new());
        let engine = StrategyEngine::new(Arc::clone(&bus));
        bus.subscribe(EventKind::Tick, engine.clone());
        (bus, engine)
    }

    #[tokio::test]
    async fn publishes_signal_from_registered_strategy() {
        let (bus, engine) = wire();
        engine.register(Box::new(MeanReversion::new(
            "mean-reversion",
            ["ACME"],
            MeanReversionConfig {
                window: 20,
                entry_z: 2.0,
            },
        )));

        for _ in 0..19 {
            bus.publish_payload(EventPayload::Tick(tick("ACME", 100)))
                .await;
        }
        bus.publish_payload(EventPayload::Tick(tick("ACME", 90)))
            .await;

        let signals = bus.history_of(EventKind::Signal);
        assert_eq!(signals.len(), 1);
        match &signals[0].payload {
            EventPayload::Signal(s) => {
                assert_eq!(s.side, Side::Buy);
                assert_eq!(s.strength, 1.0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn ignores_ticks_for_other_symbols() {
        let (bus, engine) = wire();
        engine.register(Box::new(MeanReversion::new(
            "mean-reversion",
            ["ACME"],
            MeanReversionConfig {
                window: 2,
                entry_z: 0.0,
            },
        )));

        bus.publish_payload(EventPayload::Tick(tick("OTHER", 100)))
            .await;
        bus.publish_payload(EventPayload::Tick(tick("OTHER", 200)))
            .await;
        bus.publish_payload(EventPayload::Tick(tick("OTHER", 300)))
            .await;

        assert!(bus.history_of(EventKind::Signal).is_empty());
    }

    #[tokio::test]
    async fn reset_all_replays_identically() {
        let (bus, engine) = wire();
        engine.register(Box::new(MeanReversion::new(
            "mean-reversion",
            ["ACME"],
            MeanReversionConfig {
                window: 20,
                entry_z: 2.0,
            },
        )));

        let feed = |bus: Arc<EventBus>| async move {
            for _ in 0..19 {
                bus.publish_payload(EventPayload::Tick(tick("ACME", 100)))
                    .await;
            }
            bus.publish_payload(EventPayload::Tick(tick("ACME", 90)))
                .await;
        };

        feed(Arc::clone(&bus)).await;
        assert_eq!(bus.history_of(EventKind::Signal).len(), 1);

        engine.reset_all();
        feed(Arc::clone(&bus)).await;
        assert_eq!(bus.history_of(EventKind::Signal).len(), 2);
    }
}
