//! tkd-feed
//!
//! Synthetic tick feed: a per-symbol random walk published onto the bus at a
//! fixed interval.  Quotes are symmetric around the last trade; prices are
//! clamped strictly positive.  A seeded generator makes runs reproducible.
//!
//! Exchange transports are deliberately absent — when the synthetic feed is
//! disabled the core simply sees no ticks, which it tolerates by contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use tkd_bus::EventBus;
use tkd_schemas::{EventPayload, Micros, Tick};

/// Floor for the random walk: one cent.
const MIN_PRICE_MICROS: i64 = 10_000;

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub symbols: Vec<String>,
    pub start_price: Micros,
    pub tick_interval: Duration,
    /// Maximum per-tick move, in basis points of the current price.
    pub vol_bps: i64,
    /// Half-spread applied to each quote side, in basis points.
    pub spread_bps: i64,
    /// Seed for reproducible runs; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl FeedConfig {
    pub fn sane_defaults() -> Self {
        Self {
            symbols: vec!["ACME".to_string()],
            start_price: Micros::from_units(100),
            tick_interval: Duration::from_millis(250),
            vol_bps: 20,
            spread_bps: 2,
            seed: None,
        }
    }
}

/// Handle to a running feed task.
pub struct FeedHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Signal the feed to stop and wait for the task to drain.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the synthetic feed onto the current runtime.
pub fn spawn_synthetic_feed(bus: Arc<EventBus>, cfg: FeedConfig) -> FeedHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut prices: Vec<(String, i64)> = cfg
            .symbols
            .iter()
            .map(|s| (s.clone(), cfg.start_price.raw().max(MIN_PRICE_MICROS)))
            .collect();

        let mut ticker = tokio::time::interval(cfg.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(symbols = prices.len(), interval_ms = cfg.tick_interval.as_millis() as u64,
            "synthetic feed started");

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    // A dropped handle counts as a stop request.
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    for (symbol, price) in prices.iter_mut() {
                        let step = rng.gen_range(-cfg.vol_bps..=cfg.vol_bps);
                        let next = ((*price as i128) * ((10_000 + step) as i128) / 10_000) as i64;
                        *price = next.max(MIN_PRICE_MICROS);

                        let bid = ((*price as i128) * ((10_000 - cfg.spread_bps) as i128)
                            / 10_000) as i64;
                        let ask = ((*price as i128) * ((10_000 + cfg.spread_bps) as i128)
                            / 10_000) as i64;

                        bus.publish_payload(EventPayload::Tick(Tick {
                            symbol: symbol.clone(),
                            last: Micros::new(*price),
                            bid: Micros::new(bid),
                            ask: Micros::new(ask),
                            volume: rng.gen_range(1..=1_000),
                            ts: Utc::now(),
                        }))
                        .await;
                    }
                }
            }
        }

        info!("synthetic feed stopped");
    });

    FeedHandle {
        stop: stop_tx,
        task,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
