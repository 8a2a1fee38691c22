//! tkd-portfolio
//!
//! Position and cash accounting:
//! - [`PositionBook`]: pure, deterministic average-cost state (no IO, no
//!   time, no randomness)
//! - [`PositionTracker`]: the bus service that applies fills and tick marks
//! - [`PortfolioView`]: cloneable read-only handle for risk checks and the
//!   query surface

mod book;
mod tracker;

pub use book::{BookError, PositionBook};
pub use tracker::{PortfolioView, PositionTracker};
