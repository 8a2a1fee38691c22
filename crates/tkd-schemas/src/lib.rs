//! tkd-schemas
//!
//! Shared domain and event types for the TickDesk pipeline:
//! - [`Micros`]: fixed-point money/price type at 1e-6 scale
//! - tick / signal / order / fill / position payloads
//! - the [`Event`] envelope and [`EventKind`] discriminant used by the bus
//!
//! Pure data; no IO, no async, no business logic beyond small derived
//! accessors (signed quantities, mark price, terminal-status checks).

mod events;
mod fixedpoint;

pub use events::{
    Event, EventKind, EventPayload, Fill, OrderRequest, OrderStatus, OrderType, OrderUpdate,
    PortfolioSnapshot, Position, RiskBreach, RiskRule, Side, Signal, Tick,
};
pub use fixedpoint::{Micros, ParseMicrosError};

/// Price/cash scale: micros (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;
