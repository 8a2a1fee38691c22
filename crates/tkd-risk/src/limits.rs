//! Pure deterministic pre-trade checks.
//!
//! Checks run in a fixed order (order value, position size, drawdown) and
//! the first failure wins.  Arithmetic is i128 throughout; an overflowing
//! projection is treated as a breach, never silently skipped.

use tkd_schemas::{Micros, OrderRequest, RiskRule};

/// Configurable pre-trade limits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RiskLimits {
    /// Maximum notional value of a single order.
    pub max_order_value: Micros,
    /// Maximum absolute projected position size, in shares.
    pub max_position_size: i64,
    /// Drawdown lock-out threshold as a 1e-6 fraction (100_000 = 10%).
    /// Zero disables the check.
    pub max_drawdown_micros: i64,
}

impl RiskLimits {
    pub fn sane_defaults() -> Self {
        Self {
            max_order_value: Micros::from_units(50_000),
            max_position_size: 1_000,
            max_drawdown_micros: 100_000,
        }
    }
}

/// A failed check: which rule, and an operator-readable message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breach {
    pub rule: RiskRule,
    pub message: String,
}

/// Order value check.  `reference` is the limit price for limit orders, else
/// the caller's cached last trade price; a missing reference price rejects.
fn check_order_value(
    limits: &RiskLimits,
    order: &OrderRequest,
    reference: Option<Micros>,
) -> Option<Breach> {
    let reference = match reference {
        Some(px) => px,
        None => {
            return Some(Breach {
                rule: RiskRule::MaxOrderValue,
                message: format!("no reference price for {}", order.symbol),
            })
        }
    };

    let value = (reference.raw() as i128) * (order.qty as i128);
    if value > limits.max_order_value.raw() as i128 {
        let shown = Micros::new(if value > i64::MAX as i128 {
            i64::MAX
        } else {
            value as i64
        });
        return Some(Breach {
            rule: RiskRule::MaxOrderValue,
            message: format!(
                "order value {} exceeds limit {}",
                shown, limits.max_order_value
            ),
        });
    }
    None
}

/// Projected position size check (signed: buys add, sells subtract).
fn check_position_size(
    limits: &RiskLimits,
    current_qty: i64,
    order: &OrderRequest,
) -> Option<Breach> {
    let projected = (current_qty as i128) + (order.side.signed(order.qty) as i128);
    if projected.unsigned_abs() > limits.max_position_size as u128 {
        return Some(Breach {
            rule: RiskRule::MaxPositionSize,
            message: format!(
                "projected position {} for {} exceeds limit {}",
                projected, order.symbol, limits.max_position_size
            ),
        });
    }
    None
}

/// Drawdown lock-out: trading requires drawdown strictly below the limit.
/// Compared in integer micros-fraction space: breach iff
/// `(peak − equity) · 1e6 ≥ peak · limit`.
fn check_drawdown(limits: &RiskLimits, equity: Micros, peak: Micros) -> Option<Breach> {
    if limits.max_drawdown_micros <= 0 || !peak.is_positive() || equity >= peak {
        return None;
    }

    let shortfall = (peak.raw() as i128 - equity.raw() as i128) * 1_000_000;
    let floor = (peak.raw() as i128) * (limits.max_drawdown_micros as i128);
    if shortfall >= floor {
        return Some(Breach {
            rule: RiskRule::MaxDrawdown,
            message: format!(
                "equity {} is down from peak {} beyond the {} ppm limit",
                equity, peak, limits.max_drawdown_micros
            ),
        });
    }
    None
}

/// Main evaluator.  Returns the first breach in rule order, or `None` when
/// the order passes every check.
pub fn evaluate(
    limits: &RiskLimits,
    order: &OrderRequest,
    reference: Option<Micros>,
    current_qty: i64,
    equity: Micros,
    peak_equity: Micros,
) -> Option<Breach> {
    check_order_value(limits, order, reference)
        .or_else(|| check_position_size(limits, current_qty, order))
        .or_else(|| check_drawdown(limits, equity, peak_equity))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
