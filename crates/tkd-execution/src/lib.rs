//! tkd-execution
//!
//! Signal→order translation and simulated execution.  The order manager
//! holds the order store, converts signals into market orders, waits out a
//! deterministic risk-decision window, and fills survivors at the last trade
//! price adjusted for slippage (buys above, sells below).

mod manager;
mod slippage;

pub use manager::{ExecutionConfig, OrderManager};
pub use slippage::apply_slippage;
