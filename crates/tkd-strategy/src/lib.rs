//! tkd-strategy
//!
//! The strategy capability set and its host:
//! - [`Strategy`]: `id` / `symbols` / `on_tick` / `reset` — stateful,
//!   deterministic, no IO handles, no broker access
//! - [`MeanReversion`]: rolling-window z-score strategy
//! - [`StrategyEngine`]: the bus service dispatching ticks to strategies and
//!   publishing their signals

mod engine;
mod mean_reversion;

use std::collections::BTreeSet;

use tkd_schemas::{Signal, Tick};

pub use engine::StrategyEngine;
pub use mean_reversion::{MeanReversion, MeanReversionConfig};

/// A trading strategy.
///
/// Strategies are pure state machines over ticks: `on_tick` may update
/// rolling state and optionally emit a signal; `reset` clears all state so
/// the same tick sequence reproduces the same signal stream.
pub trait Strategy: Send {
    /// Stable identifier, carried on every emitted signal.
    fn id(&self) -> &str;

    /// The symbols this strategy wants ticks for.
    fn symbols(&self) -> &BTreeSet<String>;

    /// Consume one tick; possibly emit a signal.
    fn on_tick(&mut self, tick: &Tick) -> Option<Signal>;

    /// Clear all rolling state.
    fn reset(&mut self);
}
