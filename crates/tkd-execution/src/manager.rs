//! Order manager service.
//!
//! Subscribes to `SIGNAL` (place an order), `TICK` (last-trade cache) and
//! `ORDER_UPDATE` (observe risk rejections).
//!
//! Risk-versus-fill ordering: the bus delivers `ORDER_REQUEST` to the risk
//! manager and to nobody else that fills — the fill only happens here, after
//! a deterministic `risk_wait` window.  If a rejection for the order id
//! arrives inside the window the decision timer is disarmed; otherwise the
//! order fills at the cached last price with slippage applied.  An order
//! whose symbol has never ticked cannot be priced and is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tkd_bus::{EventBus, EventHandler};
use tkd_schemas::{
    Event, EventPayload, Fill, Micros, OrderRequest, OrderStatus, Signal,
};

use crate::slippage::apply_slippage;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct ExecutionConfig {
    /// Shares at signal strength 1.0; scaled down linearly by strength.
    pub max_qty_per_signal: i64,
    /// How long a pending order waits for a risk decision before filling.
    pub risk_wait: Duration,
    /// Fill slippage in basis points (buys above, sells below reference).
    pub slippage_bps: i64,
}

impl ExecutionConfig {
    pub fn sane_defaults() -> Self {
        Self {
            max_qty_per_signal: 100,
            risk_wait: Duration::from_millis(50),
            slippage_bps: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderManager
// ---------------------------------------------------------------------------

type OrderStore = Arc<Mutex<HashMap<Uuid, OrderRequest>>>;
type PriceCache = Arc<RwLock<HashMap<String, Micros>>>;
type PendingTimers = Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>;

pub struct OrderManager {
    bus: Arc<EventBus>,
    cfg: ExecutionConfig,
    orders: OrderStore,
    last_price: PriceCache,
    pending: PendingTimers,
}

impl OrderManager {
    pub fn new(bus: Arc<EventBus>, cfg: ExecutionConfig) -> Arc<Self> {
        Arc::new(Self {
            bus,
            cfg,
            orders: Arc::new(Mutex::new(HashMap::new())),
            last_price: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Consistent snapshot of one order.
    pub fn get_order(&self, id: Uuid) -> Option<OrderRequest> {
        self.orders.lock().get(&id).cloned()
    }

    /// Number of orders still inside their decision window.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Disarm every decision timer and cancel its still-pending order.
    /// Called by the runtime during shutdown.
    pub fn shutdown(&self) {
        let drained: Vec<(Uuid, JoinHandle<()>)> = self.pending.lock().drain().collect();
        for (id, handle) in drained {
            handle.abort();
            let mut orders = self.orders.lock();
            if let Some(order) = orders.get_mut(&id) {
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Cancelled;
                    info!(order_id = %id, "cancelled pending order on shutdown");
                }
            }
        }
    }

    async fn place(&self, signal: &Signal) {
        if !(0.0..=1.0).contains(&signal.strength) {
            warn!(strategy = %signal.strategy_id, strength = signal.strength,
                "dropping signal with out-of-range strength");
            return;
        }
        let qty = (signal.strength * self.cfg.max_qty_per_signal as f64).round() as i64;
        if qty == 0 {
            debug!(strategy = %signal.strategy_id, symbol = %signal.symbol,
                "dropping zero-quantity signal");
            return;
        }

        let order = OrderRequest::market(
            &signal.symbol,
            signal.side,
            qty,
            &signal.strategy_id,
            Utc::now(),
        );
        let id = order.id;
        self.orders.lock().insert(id, order.clone());

        self.bus
            .publish_payload(EventPayload::OrderRequest(order))
            .await;

        // Arm the decision timer: the order fills (or cancels) once
        // `risk_wait` elapses with no rejection observed.
        let handle = tokio::spawn(settle(
            Arc::clone(&self.bus),
            Arc::clone(&self.orders),
            Arc::clone(&self.last_price),
            Arc::clone(&self.pending),
            self.cfg,
            id,
        ));
        self.pending.lock().insert(id, handle);
    }

    fn on_rejection(&self, order_id: Uuid) {
        if let Some(handle) = self.pending.lock().remove(&order_id) {
            handle.abort();
        }
        let mut orders = self.orders.lock();
        if let Some(order) = orders.get_mut(&order_id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Rejected;
            }
        }
    }
}

/// Decision-window task for one order.  Sleeps out `risk_wait`, then fills
/// the order if it is still pending, or cancels it when no price exists.
async fn settle(
    bus: Arc<EventBus>,
    orders: OrderStore,
    last_price: PriceCache,
    pending: PendingTimers,
    cfg: ExecutionConfig,
    id: Uuid,
) {
    tokio::time::sleep(cfg.risk_wait).await;

    let fill = {
        let mut orders = orders.lock();
        match orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::Pending => {
                let last = last_price.read().get(&order.symbol).copied();
                match last {
                    None => {
                        // Never saw a tick for this symbol: no fill price.
                        order.status = OrderStatus::Cancelled;
                        info!(order_id = %id, symbol = %order.symbol,
                            "cancelled order with no observed price");
                        None
                    }
                    Some(reference) => {
                        // Submitted → Filled collapses into one step; there
                        // is no venue to wait on.
                        order.status = OrderStatus::Filled;
                        let price = apply_slippage(reference, order.side, cfg.slippage_bps);
                        Some(Fill {
                            id: Uuid::new_v4(),
                            order_id: id,
                            symbol: order.symbol.clone(),
                            side: order.side,
                            qty: order.qty,
                            price,
                            filled_at: Utc::now(),
                        })
                    }
                }
            }
            _ => None,
        }
    };

    pending.lock().remove(&id);

    if let Some(fill) = fill {
        bus.publish_payload(EventPayload::Fill(fill)).await;
    }
}

#[async_trait]
impl EventHandler for OrderManager {
    fn name(&self) -> &str {
        "order-manager"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        match &event.payload {
            EventPayload::Signal(signal) => self.place(signal).await,
            EventPayload::Tick(tick) => {
                if tick.last.is_positive() {
                    self.last_price
                        .write()
                        .insert(tick.symbol.clone(), tick.last);
                }
            }
            EventPayload::OrderUpdate(update) => {
                if update.status == OrderStatus::Rejected {
                    self.on_rejection(update.order_id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (bus-level scenarios live in tests/)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sane_defaults() {
        let cfg = ExecutionConfig::sane_defaults();
        assert_eq!(cfg.max_qty_per_signal, 100);
        assert_eq!(cfg.risk_wait, Duration::from_millis(50));
        assert_eq!(cfg.slippage_bps, 5);
    }

    #[test]
    fn strength_scales_quantity_with_rounding() {
        // Mirrors the arithmetic in `place`.
        let max = 100f64;
        assert_eq!((1.0 * max).round() as i64, 100);
        assert_eq!((0.5 * max).round() as i64, 50);
        assert_eq!((0.004 * max).round() as i64, 0);
        assert_eq!((0.005 * max).round() as i64, 1);
    }
}
