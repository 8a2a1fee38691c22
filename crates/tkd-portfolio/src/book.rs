//! Average-cost position book.
//!
//! Accounting rules per fill (qty q > 0, price p, signed = +q buy / -q sell):
//!
//! 1. Cash moves first: `cash -= signed · p`.  Realized P&L is implicit in
//!    this delta — closing at a different price than entry *is* the cash
//!    differential — and is never credited to cash separately.
//! 2. Flat or same-sign fill: volume-weighted new average entry,
//!    `qty += signed`, realized unchanged.
//! 3. Reducing fill (`q ≤ |qty|`): realized += `q · (p − avg) · sign(qty)`;
//!    average unchanged, reset to 0 when the position goes flat.
//! 4. Flipping fill (`q > |qty|`): the old position closes per rule 3, the
//!    remainder opens at `p` with the opposite sign.
//!
//! Tick marks refresh `last_mark` and unrealized P&L; the equity peak is
//! maintained on every mutation so drawdown reads are lock-and-go.
//!
//! All cash/quantity arithmetic is checked; overflow is a fatal
//! [`BookError::Overflow`].  Derived metrics (unrealized totals, equity)
//! accumulate in i128 and clamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tkd_schemas::{Fill, Micros, PortfolioSnapshot, Position, Side};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Invariant violations the book can surface.  The book is **not** mutated
/// when an error is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// `Fill.qty` must be strictly positive.
    NonPositiveQty { qty: i64 },
    /// Prices must be strictly positive.
    NonPositivePrice { price: Micros },
    /// Cash, quantity, or realized P&L left the i64 range.  Fatal.
    Overflow { symbol: String },
}

impl BookError {
    /// Overflow corrupts money state and must shut the process down;
    /// everything else is a validation drop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BookError::Overflow { .. })
    }
}

impl std::fmt::Display for BookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty } => {
                write!(f, "book invariant: qty must be > 0, got {qty}")
            }
            Self::NonPositivePrice { price } => {
                write!(f, "book invariant: price must be > 0, got {price}")
            }
            Self::Overflow { symbol } => {
                write!(f, "fixed-point overflow while accounting {symbol}")
            }
        }
    }
}

impl std::error::Error for BookError {}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

fn i128_to_micros_checked(x: i128, symbol: &str) -> Result<Micros, BookError> {
    if x > i64::MAX as i128 || x < i64::MIN as i128 {
        Err(BookError::Overflow {
            symbol: symbol.to_string(),
        })
    } else {
        Ok(Micros::new(x as i64))
    }
}

/// Realized P&L of closing `closed_qty` units of a position whose direction
/// is `sign(prior_qty)`: long closed higher → positive, short closed lower →
/// positive.
fn realized_delta(
    closed_qty: i64,
    price: Micros,
    avg: Micros,
    prior_qty: i64,
    symbol: &str,
) -> Result<Micros, BookError> {
    let pnl = (closed_qty as i128)
        * ((price.raw() as i128) - (avg.raw() as i128))
        * (prior_qty.signum() as i128);
    i128_to_micros_checked(pnl, symbol)
}

/// Mark-to-market P&L of the open quantity relative to its average entry.
fn unrealized(pos: &Position) -> Micros {
    if pos.qty == 0 || !pos.last_mark.is_positive() {
        return Micros::ZERO;
    }
    let pnl = (pos.qty as i128)
        * ((pos.last_mark.raw() as i128) - (pos.avg_entry_price.raw() as i128));
    Micros::new(i128_to_i64_clamp(pnl))
}

// ---------------------------------------------------------------------------
// PositionBook
// ---------------------------------------------------------------------------

/// Pure average-cost portfolio state.  Deterministic: two books fed the same
/// fill/mark sequence always end up identical.
#[derive(Clone, Debug)]
pub struct PositionBook {
    cash: Micros,
    positions: BTreeMap<String, Position>,
    peak_equity: Micros,
}

impl PositionBook {
    /// New book with the given cash balance; the equity peak starts there.
    pub fn new(initial_cash: Micros) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
            peak_equity: initial_cash,
        }
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    /// Apply one fill and return the updated position.
    ///
    /// Fills are authoritative: a fill is applied whether or not its order id
    /// is known to anyone.
    ///
    /// # Errors
    /// [`BookError`] on invalid input or fixed-point overflow; the book is
    /// untouched on error.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<Position, BookError> {
        if fill.qty <= 0 {
            return Err(BookError::NonPositiveQty { qty: fill.qty });
        }
        if !fill.price.is_positive() {
            return Err(BookError::NonPositivePrice { price: fill.price });
        }

        let overflow = || BookError::Overflow {
            symbol: fill.symbol.clone(),
        };

        let signed = fill.side.signed(fill.qty);
        let price = fill.price;

        let notional = price.checked_mul_qty(fill.qty).ok_or_else(overflow)?;
        let new_cash = match fill.side {
            Side::Buy => self.cash.checked_sub(notional),
            Side::Sell => self.cash.checked_add(notional),
        }
        .ok_or_else(overflow)?;

        // Work on a local copy so an error never leaves partial state behind.
        let mut pos = self
            .positions
            .get(&fill.symbol)
            .cloned()
            .unwrap_or_else(|| Position::flat(&fill.symbol));

        let prior_qty = pos.qty;
        let new_qty = prior_qty.checked_add(signed).ok_or_else(overflow)?;

        if prior_qty == 0 || prior_qty.signum() == signed.signum() {
            // Opening or adding: volume-weighted average, rounded half-up.
            let denom = (prior_qty.abs() as i128) + (fill.qty as i128);
            let num = (prior_qty.abs() as i128) * (pos.avg_entry_price.raw() as i128)
                + (fill.qty as i128) * (price.raw() as i128);
            pos.avg_entry_price = i128_to_micros_checked((num + denom / 2) / denom, &fill.symbol)?;
            pos.qty = new_qty;
        } else if fill.qty <= prior_qty.abs() {
            // Reducing or closing against the unchanged average.
            let delta = realized_delta(fill.qty, price, pos.avg_entry_price, prior_qty, &fill.symbol)?;
            pos.realized_pnl = pos.realized_pnl.checked_add(delta).ok_or_else(overflow)?;
            pos.qty = new_qty;
            if pos.qty == 0 {
                pos.avg_entry_price = Micros::ZERO;
            }
        } else {
            // Flipping through zero: close the whole prior position, open
            // the remainder at the fill price with the opposite sign.
            let delta = realized_delta(
                prior_qty.abs(),
                price,
                pos.avg_entry_price,
                prior_qty,
                &fill.symbol,
            )?;
            pos.realized_pnl = pos.realized_pnl.checked_add(delta).ok_or_else(overflow)?;
            pos.qty = new_qty;
            pos.avg_entry_price = price;
        }

        pos.unrealized_pnl = unrealized(&pos);

        self.cash = new_cash;
        self.positions.insert(fill.symbol.clone(), pos.clone());
        self.refresh_peak();
        Ok(pos)
    }

    /// Apply a tick mark: set `last_mark` and refresh unrealized P&L.
    ///
    /// A mark for a symbol with no fills yet creates a flat entry so the
    /// symbol becomes queryable.  No event is produced for marks.
    pub fn apply_mark(&mut self, symbol: &str, mark: Micros) -> Result<(), BookError> {
        if !mark.is_positive() {
            return Err(BookError::NonPositivePrice { price: mark });
        }

        let pos = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol));
        pos.last_mark = mark;
        pos.unrealized_pnl = unrealized(pos);

        self.refresh_peak();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn cash(&self) -> Micros {
        self.cash
    }

    pub fn peak_equity(&self) -> Micros {
        self.peak_equity
    }

    /// Mark-to-market equity: `cash + Σ(qty · last_mark)`.
    pub fn equity(&self) -> Micros {
        let mut total: i128 = self.cash.raw() as i128;
        for pos in self.positions.values() {
            total += (pos.qty as i128) * (pos.last_mark.raw() as i128);
        }
        Micros::new(i128_to_i64_clamp(total))
    }

    /// Position for one symbol, if it was ever touched.
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).cloned()
    }

    /// All touched positions in symbol order.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Portfolio totals at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> PortfolioSnapshot {
        let mut total_unrealized: i128 = 0;
        let mut total_realized: i128 = 0;
        for pos in self.positions.values() {
            total_unrealized += pos.unrealized_pnl.raw() as i128;
            total_realized += pos.realized_pnl.raw() as i128;
        }

        let equity = self.equity();
        let peak = self.peak_equity;
        let drawdown_pct = if peak.is_positive() && equity < peak {
            (peak.raw() as i128 - equity.raw() as i128) as f64 / peak.raw() as f64
        } else {
            0.0
        };

        PortfolioSnapshot {
            cash: self.cash,
            total_unrealized: Micros::new(i128_to_i64_clamp(total_unrealized)),
            total_realized: Micros::new(i128_to_i64_clamp(total_realized)),
            total_equity: equity,
            peak_equity: peak,
            drawdown_pct,
            snapshot_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn refresh_peak(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
