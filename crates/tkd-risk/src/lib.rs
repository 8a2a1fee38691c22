//! tkd-risk
//!
//! Pre-trade gate.  [`limits`] holds the pure deterministic checks (no IO,
//! no time); [`manager`] is the bus service that caches last prices, reads
//! the live portfolio view, and turns failed checks into
//! `RISK_BREACH` + `ORDER_UPDATE(REJECTED)` pairs.

mod limits;
mod manager;

pub use limits::{evaluate, Breach, RiskLimits};
pub use manager::RiskManager;
