//! Domain payloads and the event envelope.
//!
//! Events are a closed tagged union: each variant has a fixed schema and the
//! bus routes on [`EventKind`], the payload discriminant.  Timestamps are
//! `DateTime<Utc>`; ids are v4 UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fixedpoint::Micros;

// ---------------------------------------------------------------------------
// Sides, order types, statuses
// ---------------------------------------------------------------------------

/// BUY or SELL.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Signed quantity for this side: buys add, sells subtract.
    #[inline]
    pub fn signed(self, qty: i64) -> i64 {
        match self {
            Side::Buy => qty,
            Side::Sell => -qty,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order pricing type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order lifecycle status.
///
/// `Pending → (Submitted → Filled) | Cancelled | Rejected`.
/// `PartiallyFilled` is reserved: every accepted order fills whole today.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Which pre-trade limit an order breached.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRule {
    MaxOrderValue,
    MaxPositionSize,
    MaxDrawdown,
}

impl std::fmt::Display for RiskRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskRule::MaxOrderValue => "MAX_ORDER_VALUE",
            RiskRule::MaxPositionSize => "MAX_POSITION_SIZE",
            RiskRule::MaxDrawdown => "MAX_DRAWDOWN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A price observation from the feed.  Immutable; never mutated downstream.
///
/// `bid`/`ask` may be zero when the feed is unquoted on that side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub last: Micros,
    pub bid: Micros,
    pub ask: Micros,
    pub volume: i64,
    pub ts: DateTime<Utc>,
}

impl Tick {
    /// Mark price: quote midpoint when both sides are quoted, else last.
    pub fn mark(&self) -> Micros {
        if self.bid.is_positive() && self.ask.is_positive() {
            Micros::new((self.bid.raw() + self.ask.raw()) / 2)
        } else {
            self.last
        }
    }
}

/// A strategy's intent to buy or sell with an intensity in [0, 1].
///
/// Consumed once by the order manager; not persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub strength: f64,
    pub ts: DateTime<Utc>,
}

/// An intended trade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub order_type: OrderType,
    /// Required iff `order_type == Limit`.
    pub limit_price: Option<Micros>,
    pub strategy_id: String,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

impl OrderRequest {
    /// New market order in `Pending` status with a fresh id.
    pub fn market(
        symbol: impl Into<String>,
        side: Side,
        qty: i64,
        strategy_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            qty,
            order_type: OrderType::Market,
            limit_price: None,
            strategy_id: strategy_id.into(),
            created_at,
            status: OrderStatus::Pending,
        }
    }

    /// Reference price for value checks: the limit price for limit orders,
    /// none for market orders (the caller falls back to its price cache).
    pub fn reference_price(&self) -> Option<Micros> {
        match self.order_type {
            OrderType::Limit => self.limit_price,
            OrderType::Market => None,
        }
    }
}

/// Status transition notice for one order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// An executed trade.  Immutable; one fill per accepted order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: Micros,
    pub filled_at: DateTime<Utc>,
}

/// Per-symbol position state.
///
/// `qty` is signed (+long, -short).  Flat positions keep their entry in the
/// book with `qty = 0` and `avg_entry_price = 0` so the symbol stays
/// queryable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: i64,
    pub avg_entry_price: Micros,
    pub realized_pnl: Micros,
    pub unrealized_pnl: Micros,
    pub last_mark: Micros,
}

impl Position {
    /// A fresh flat position for `symbol`.
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            qty: 0,
            avg_entry_price: Micros::ZERO,
            realized_pnl: Micros::ZERO,
            unrealized_pnl: Micros::ZERO,
            last_mark: Micros::ZERO,
        }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.qty == 0
    }
}

/// Point-in-time portfolio totals.
///
/// `drawdown_pct` is display-only; limit checks compare `peak_equity` and
/// `total_equity` in integer space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Micros,
    pub total_unrealized: Micros,
    pub total_realized: Micros,
    pub total_equity: Micros,
    pub peak_equity: Micros,
    pub drawdown_pct: f64,
    pub snapshot_at: DateTime<Utc>,
}

/// A pre-trade limit violation for one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBreach {
    pub rule: RiskRule,
    pub message: String,
    pub order_id: Uuid,
}

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// Closed tagged union of everything that travels on the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    Tick(Tick),
    Signal(Signal),
    OrderRequest(OrderRequest),
    OrderUpdate(OrderUpdate),
    Fill(Fill),
    PositionUpdate(Position),
    RiskBreach(RiskBreach),
}

/// Payload discriminant used for subscriptions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Tick,
    Signal,
    OrderRequest,
    OrderUpdate,
    Fill,
    PositionUpdate,
    RiskBreach,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Tick => "TICK",
            EventKind::Signal => "SIGNAL",
            EventKind::OrderRequest => "ORDER_REQUEST",
            EventKind::OrderUpdate => "ORDER_UPDATE",
            EventKind::Fill => "FILL",
            EventKind::PositionUpdate => "POSITION_UPDATE",
            EventKind::RiskBreach => "RISK_BREACH",
        };
        write!(f, "{s}")
    }
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Tick(_) => EventKind::Tick,
            EventPayload::Signal(_) => EventKind::Signal,
            EventPayload::OrderRequest(_) => EventKind::OrderRequest,
            EventPayload::OrderUpdate(_) => EventKind::OrderUpdate,
            EventPayload::Fill(_) => EventKind::Fill,
            EventPayload::PositionUpdate(_) => EventKind::PositionUpdate,
            EventPayload::RiskBreach(_) => EventKind::RiskBreach,
        }
    }
}

/// The envelope the bus delivers: payload plus identity and wall-clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Wrap a payload with a fresh id and the current wall-clock.
    pub fn now(payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            ts: Utc::now(),
            payload,
        }
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, last: i64, bid: i64, ask: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            last: Micros::new(last),
            bid: Micros::new(bid),
            ask: Micros::new(ask),
            volume: 10,
            ts: Utc::now(),
        }
    }

    #[test]
    fn side_signed_quantities() {
        assert_eq!(Side::Buy.signed(5), 5);
        assert_eq!(Side::Sell.signed(5), -5);
    }

    #[test]
    fn mark_uses_midpoint_when_quoted() {
        let t = tick("ACME", 100_000_000, 99_000_000, 101_000_000);
        assert_eq!(t.mark(), Micros::new(100_000_000));
    }

    #[test]
    fn mark_falls_back_to_last_when_unquoted() {
        let t = tick("ACME", 100_000_000, 0, 0);
        assert_eq!(t.mark(), Micros::new(100_000_000));
        let one_sided = tick("ACME", 100_000_000, 99_000_000, 0);
        assert_eq!(one_sided.mark(), Micros::new(100_000_000));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn market_order_has_no_reference_price() {
        let o = OrderRequest::market("ACME", Side::Buy, 10, "mr", Utc::now());
        assert_eq!(o.reference_price(), None);
        assert_eq!(o.status, OrderStatus::Pending);
        assert_eq!(o.order_type, OrderType::Market);
    }

    #[test]
    fn event_kind_matches_payload() {
        let e = Event::now(EventPayload::Tick(tick("ACME", 1, 0, 0)));
        assert_eq!(e.kind(), EventKind::Tick);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let e = Event::now(EventPayload::OrderUpdate(OrderUpdate {
            order_id: Uuid::new_v4(),
            status: OrderStatus::Rejected,
        }));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "ORDER_UPDATE");
        assert_eq!(json["payload"]["status"], "REJECTED");
    }

    #[test]
    fn order_ids_are_unique() {
        let a = OrderRequest::market("ACME", Side::Buy, 1, "mr", Utc::now());
        let b = OrderRequest::market("ACME", Side::Buy, 1, "mr", Utc::now());
        assert_ne!(a.id, b.id);
    }
}
