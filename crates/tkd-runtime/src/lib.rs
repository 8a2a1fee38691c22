//! tkd-runtime
//!
//! Composes the trading components into one running pipeline:
//!
//!   feed → TICK → {strategy engine, order manager, risk manager, tracker}
//!   strategy → SIGNAL → order manager → ORDER_REQUEST → risk manager
//!   (pass: FILL after the decision window; fail: ORDER_UPDATE + RISK_BREACH)
//!   → tracker → POSITION_UPDATE → persistence sink
//!
//! plus a 1 Hz snapshot timer feeding the SSE broadcast channel and the
//! snapshot table.  Shutdown stops services in reverse construction order
//! under a bounded drain; pending fill timers are cancelled and their orders
//! marked CANCELLED.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tkd_bus::EventBus;
use tkd_config::AppConfig;
use tkd_db::PersistenceSink;
use tkd_execution::{ExecutionConfig, OrderManager};
use tkd_feed::{spawn_synthetic_feed, FeedConfig, FeedHandle};
use tkd_portfolio::{PortfolioView, PositionTracker};
use tkd_risk::{RiskLimits, RiskManager};
use tkd_schemas::{EventKind, Micros, PortfolioSnapshot};
use tkd_strategy::{MeanReversion, MeanReversionConfig, StrategyEngine};

/// Capacity of the snapshot broadcast channel; SSE readers that lag simply
/// miss frames.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

pub struct TradingRuntime {
    bus: Arc<EventBus>,
    tracker: Arc<PositionTracker>,
    orders: Arc<OrderManager>,
    engine: Arc<StrategyEngine>,
    snapshots: broadcast::Sender<PortfolioSnapshot>,
    pool: Option<PgPool>,
    feed_cfg: Option<FeedConfig>,
    feed: Option<FeedHandle>,
    snapshot_task: Option<JoinHandle<()>>,
    fatal_rx: watch::Receiver<bool>,
}

impl TradingRuntime {
    /// Wire every component onto a fresh bus.  Nothing runs until
    /// [`start`](Self::start).
    pub fn build(cfg: &AppConfig, pool: Option<PgPool>) -> Self {
        let bus = Arc::new(EventBus::new());

        let tracker = PositionTracker::new(Arc::clone(&bus), cfg.initial_cash);
        bus.subscribe(EventKind::Fill, tracker.clone());
        bus.subscribe(EventKind::Tick, tracker.clone());
        let fatal_rx = tracker.fatal_signal();

        let risk = RiskManager::new(
            Arc::clone(&bus),
            RiskLimits {
                max_order_value: cfg.max_order_value,
                max_position_size: cfg.max_position_size,
                max_drawdown_micros: cfg.max_drawdown_fraction_micros(),
            },
            tracker.view(),
        );
        bus.subscribe(EventKind::OrderRequest, risk.clone());
        bus.subscribe(EventKind::Tick, risk);

        let orders = OrderManager::new(
            Arc::clone(&bus),
            ExecutionConfig {
                max_qty_per_signal: cfg.max_qty_per_signal,
                risk_wait: Duration::from_millis(cfg.risk_wait_ms),
                slippage_bps: cfg.slippage_bps,
            },
        );
        bus.subscribe(EventKind::Signal, orders.clone());
        bus.subscribe(EventKind::Tick, orders.clone());
        bus.subscribe(EventKind::OrderUpdate, orders.clone());

        let engine = StrategyEngine::new(Arc::clone(&bus));
        engine.register(Box::new(MeanReversion::new(
            "mean-reversion",
            cfg.feed_symbols.iter().cloned(),
            MeanReversionConfig {
                window: cfg.strategy_window,
                entry_z: cfg.strategy_entry_z,
            },
        )));
        bus.subscribe(EventKind::Tick, engine.clone());

        if let Some(pool) = &pool {
            let sink = PersistenceSink::new(pool.clone());
            bus.subscribe(EventKind::OrderRequest, sink.clone());
            bus.subscribe(EventKind::OrderUpdate, sink.clone());
            bus.subscribe(EventKind::Fill, sink.clone());
            bus.subscribe(EventKind::PositionUpdate, sink);
        }

        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let feed_cfg = cfg.use_synthetic_feed.then(|| FeedConfig {
            symbols: cfg.feed_symbols.clone(),
            start_price: Micros::from_units(100),
            tick_interval: Duration::from_millis(cfg.feed_tick_interval_ms),
            vol_bps: 20,
            spread_bps: 2,
            seed: cfg.feed_seed,
        });

        Self {
            bus,
            tracker,
            orders,
            engine,
            snapshots,
            pool,
            feed_cfg,
            feed: None,
            snapshot_task: None,
            fatal_rx,
        }
    }

    /// Start the feed (when enabled) and the 1 Hz snapshot timer.
    pub fn start(&mut self) {
        if let Some(feed_cfg) = self.feed_cfg.take() {
            self.feed = Some(spawn_synthetic_feed(Arc::clone(&self.bus), feed_cfg));
        } else {
            info!("synthetic feed disabled; core will idle without ticks");
        }

        let view = self.view();
        let snapshots = self.snapshots.clone();
        let pool = self.pool.clone();
        self.snapshot_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let snapshot = view.snapshot(Utc::now());
                let _ = snapshots.send(snapshot.clone());
                if let Some(pool) = &pool {
                    if let Err(err) = tkd_db::insert_snapshot(pool, &snapshot).await {
                        warn!(error = %err, "best-effort snapshot write failed");
                    }
                }
            }
        }));
    }

    /// Stop services in reverse construction order under a bounded drain.
    pub async fn shutdown(mut self, drain: Duration) {
        if let Some(feed) = self.feed.take() {
            if tokio::time::timeout(drain, feed.stop()).await.is_err() {
                warn!("feed did not drain within the shutdown deadline");
            }
        }

        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }

        // Pending decision timers go last: their orders become CANCELLED.
        self.orders.shutdown();

        info!("trading runtime stopped");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn view(&self) -> PortfolioView {
        self.tracker.view()
    }

    pub fn orders(&self) -> Arc<OrderManager> {
        Arc::clone(&self.orders)
    }

    pub fn engine(&self) -> Arc<StrategyEngine> {
        Arc::clone(&self.engine)
    }

    pub fn pool(&self) -> Option<PgPool> {
        self.pool.clone()
    }

    /// Sender side of the 1 Hz snapshot channel (subscribe for SSE).
    pub fn snapshots(&self) -> broadcast::Sender<PortfolioSnapshot> {
        self.snapshots.clone()
    }

    /// Becomes `true` when a component reports an unrecoverable error.
    pub fn fatal(&self) -> watch::Receiver<bool> {
        self.fatal_rx.clone()
    }
}
