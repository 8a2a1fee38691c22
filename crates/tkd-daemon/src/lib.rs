//! tkd-daemon
//!
//! Read-only HTTP/SSE query surface over the trading runtime.  The daemon
//! is a subscriber and reader of core state, never a mutator: handlers reach
//! positions through [`tkd_portfolio::PortfolioView`] and order/fill history
//! through the persistence layer.

pub mod api_types;
pub mod routes;
pub mod state;
