//! Position tracker service.
//!
//! Subscribes to `FILL` (mutate the book, publish `POSITION_UPDATE`) and
//! `TICK` (refresh the symbol's mark; no event — ticks are high-frequency
//! and mark updates are observed via snapshots).
//!
//! The book is mutated only from bus handlers; readers go through
//! [`PortfolioView`] and get cloned snapshots, never references into live
//! state.  A fatal accounting error (fixed-point overflow) flips a watch
//! flag the runtime uses to shut the process down.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, warn};

use tkd_bus::{EventBus, EventHandler};
use tkd_schemas::{Event, EventPayload, Micros, PortfolioSnapshot, Position};

use crate::book::{BookError, PositionBook};

// ---------------------------------------------------------------------------
// PortfolioView
// ---------------------------------------------------------------------------

/// Cloneable read-only handle over the live book.  Every accessor clones the
/// data out under a short read lock.
#[derive(Clone)]
pub struct PortfolioView {
    book: Arc<RwLock<PositionBook>>,
}

impl PortfolioView {
    pub fn snapshot(&self, now: DateTime<Utc>) -> PortfolioSnapshot {
        self.book.read().snapshot(now)
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.book.read().position(symbol)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.book.read().positions()
    }

    pub fn cash(&self) -> Micros {
        self.book.read().cash()
    }
}

// ---------------------------------------------------------------------------
// PositionTracker
// ---------------------------------------------------------------------------

/// The bus service owning the position book.
pub struct PositionTracker {
    bus: Arc<EventBus>,
    book: Arc<RwLock<PositionBook>>,
    fatal_tx: watch::Sender<bool>,
}

impl PositionTracker {
    pub fn new(bus: Arc<EventBus>, initial_cash: Micros) -> Arc<Self> {
        let (fatal_tx, _) = watch::channel(false);
        Arc::new(Self {
            bus,
            book: Arc::new(RwLock::new(PositionBook::new(initial_cash))),
            fatal_tx,
        })
    }

    /// Read-only handle for the risk manager and the query surface.
    pub fn view(&self) -> PortfolioView {
        PortfolioView {
            book: Arc::clone(&self.book),
        }
    }

    /// Becomes `true` once the book hits a fatal accounting error.
    pub fn fatal_signal(&self) -> watch::Receiver<bool> {
        self.fatal_tx.subscribe()
    }
}

#[async_trait]
impl EventHandler for PositionTracker {
    fn name(&self) -> &str {
        "position-tracker"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        match &event.payload {
            EventPayload::Fill(fill) => {
                // Fills are authoritative: applied even when the order id is
                // unknown to the rest of the system.
                let applied = self.book.write().apply_fill(fill);
                match applied {
                    Ok(position) => {
                        self.bus
                            .publish_payload(EventPayload::PositionUpdate(position))
                            .await;
                    }
                    Err(err) if err.is_fatal() => {
                        error!(order_id = %fill.order_id, symbol = %fill.symbol, error = %err,
                            "fatal accounting error; requesting shutdown");
                        // send_replace stores the flag even when nobody has
                        // subscribed to the watch yet.
                        self.fatal_tx.send_replace(true);
                        return Err(err.into());
                    }
                    Err(err) => {
                        warn!(order_id = %fill.order_id, symbol = %fill.symbol, error = %err,
                            "dropping invalid fill");
                    }
                }
            }
            EventPayload::Tick(tick) => {
                if !tick.last.is_positive() {
                    warn!(symbol = %tick.symbol, last = %tick.last, "dropping non-positive tick");
                    return Ok(());
                }
                if let Err(err) = self.book.write().apply_mark(&tick.symbol, tick.mark()) {
                    debug_assert!(!err.is_fatal());
                    warn!(symbol = %tick.symbol, error = %err, "dropping tick mark");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (service-level scenarios live in tests/)
// ---------------------------------------------------------------------------
