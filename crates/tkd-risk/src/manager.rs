//! Risk manager service.
//!
//! Subscribes to `TICK` (last-trade price cache per symbol) and
//! `ORDER_REQUEST`.  Failed checks publish `RISK_BREACH` followed by
//! `ORDER_UPDATE(REJECTED)` for the same order id; passing orders get
//! silence — the order manager proceeds on its decision timer.
//!
//! The manager reads the position tracker's state through [`PortfolioView`]
//! snapshots and never mutates it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use tkd_bus::{EventBus, EventHandler};
use tkd_portfolio::PortfolioView;
use tkd_schemas::{
    Event, EventPayload, Micros, OrderRequest, OrderStatus, OrderUpdate, RiskBreach,
};

use crate::limits::{evaluate, RiskLimits};

pub struct RiskManager {
    bus: Arc<EventBus>,
    limits: RiskLimits,
    view: PortfolioView,
    last_price: RwLock<HashMap<String, Micros>>,
}

impl RiskManager {
    pub fn new(bus: Arc<EventBus>, limits: RiskLimits, view: PortfolioView) -> Arc<Self> {
        Arc::new(Self {
            bus,
            limits,
            view,
            last_price: RwLock::new(HashMap::new()),
        })
    }

    async fn gate(&self, order: &OrderRequest) {
        let reference = order
            .reference_price()
            .or_else(|| self.last_price.read().get(&order.symbol).copied());

        let current_qty = self
            .view
            .position(&order.symbol)
            .map(|p| p.qty)
            .unwrap_or(0);
        let snap = self.view.snapshot(Utc::now());

        let breach = evaluate(
            &self.limits,
            order,
            reference,
            current_qty,
            snap.total_equity,
            snap.peak_equity,
        );

        if let Some(breach) = breach {
            info!(order_id = %order.id, symbol = %order.symbol, rule = %breach.rule,
                message = %breach.message, "order rejected");
            self.bus
                .publish_payload(EventPayload::RiskBreach(RiskBreach {
                    rule: breach.rule,
                    message: breach.message,
                    order_id: order.id,
                }))
                .await;
            self.bus
                .publish_payload(EventPayload::OrderUpdate(OrderUpdate {
                    order_id: order.id,
                    status: OrderStatus::Rejected,
                }))
                .await;
        }
    }
}

#[async_trait]
impl EventHandler for RiskManager {
    fn name(&self) -> &str {
        "risk-manager"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        match &event.payload {
            EventPayload::Tick(tick) => {
                if tick.last.is_positive() {
                    self.last_price
                        .write()
                        .insert(tick.symbol.clone(), tick.last);
                }
            }
            EventPayload::OrderRequest(order) => {
                if order.qty <= 0 {
                    warn!(order_id = %order.id, qty = order.qty, "dropping malformed order request");
                    return Ok(());
                }
                self.gate(order).await;
            }
            _ => {}
        }
        Ok(())
    }
}
