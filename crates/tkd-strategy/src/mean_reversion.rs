//! Mean-reversion strategy.
//!
//! Per symbol, a fixed-capacity FIFO of the last `window` trade prices.
//! Once the window is full, each tick computes the z-score of the newest
//! price against the window's mean and sample standard deviation:
//! a deep discount (`z < -entry_z`) is a buy, a rich print (`z > entry_z`)
//! a sell, with strength proportional to how far past the entry threshold
//! the price moved, capped at 1.
//!
//! Statistics are f64; that is the one place floating point is allowed —
//! signal strength is an intensity, not money.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tkd_schemas::{Side, Signal, Tick};

use crate::Strategy;

/// Degenerate-window guard: below this stdev the window is flat.
const MIN_STDEV: f64 = 1e-9;

#[derive(Copy, Clone, Debug)]
pub struct MeanReversionConfig {
    /// Rolling window length in ticks.
    pub window: usize,
    /// Entry threshold in standard deviations (strict inequality).
    pub entry_z: f64,
}

impl MeanReversionConfig {
    pub fn sane_defaults() -> Self {
        Self {
            window: 20,
            entry_z: 2.0,
        }
    }
}

pub struct MeanReversion {
    id: String,
    symbols: BTreeSet<String>,
    cfg: MeanReversionConfig,
    windows: HashMap<String, VecDeque<f64>>,
}

impl MeanReversion {
    pub fn new<I, S>(id: impl Into<String>, symbols: I, cfg: MeanReversionConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            symbols: symbols.into_iter().map(Into::into).collect(),
            cfg,
            windows: HashMap::new(),
        }
    }
}

impl Strategy for MeanReversion {
    fn id(&self) -> &str {
        &self.id
    }

    fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
        if !tick.last.is_positive() {
            return None;
        }

        let price = tick.last.raw() as f64 / 1e6;
        let window = self
            .windows
            .entry(tick.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.cfg.window));
        window.push_back(price);
        if window.len() > self.cfg.window {
            window.pop_front();
        }
        if window.len() < self.cfg.window {
            return None;
        }

        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let stdev = var.sqrt();
        if stdev < MIN_STDEV {
            return None;
        }

        let z = (price - mean) / stdev;
        let side = if z < -self.cfg.entry_z {
            Side::Buy
        } else if z > self.cfg.entry_z {
            Side::Sell
        } else {
            return None;
        };

        let strength = (z.abs() / (2.0 * self.cfg.entry_z)).min(1.0);
        Some(Signal {
            strategy_id: self.id.clone(),
            symbol: tick.symbol.clone(),
            side,
            strength,
            ts: tick.ts,
        })
    }

    fn reset(&mut self) {
        self.windows.clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tkd_schemas::Micros;

    fn tick(symbol: &str, last_units: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            last: Micros::from_units(last_units),
            bid: Micros::ZERO,
            ask: Micros::ZERO,
            volume: 1,
            ts: Utc::now(),
        }
    }

    fn strategy(window: usize, entry_z: f64) -> MeanReversion {
        MeanReversion::new(
            "mean-reversion",
            ["ACME"],
            MeanReversionConfig { window, entry_z },
        )
    }

    #[test]
    fn silent_until_window_is_full() {
        let mut s = strategy(20, 2.0);
        for _ in 0..19 {
            assert_eq!(s.on_tick(&tick("ACME", 100)), None);
        }
    }

    #[test]
    fn deep_discount_emits_full_strength_buy() {
        // 19 × 100 then 90: mean 99.5, sample stdev √5, z ≈ -4.25
        let mut s = strategy(20, 2.0);
        for _ in 0..19 {
            assert_eq!(s.on_tick(&tick("ACME", 100)), None);
        }
        let signal = s.on_tick(&tick("ACME", 90)).expect("signal");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.strength, 1.0);
        assert_eq!(signal.symbol, "ACME");
        assert_eq!(signal.strategy_id, "mean-reversion");
    }

    #[test]
    fn rich_print_emits_sell() {
        let mut s = strategy(20, 2.0);
        for _ in 0..19 {
            s.on_tick(&tick("ACME", 100));
        }
        let signal = s.on_tick(&tick("ACME", 110)).expect("signal");
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.strength, 1.0);
    }

    #[test]
    fn flat_window_has_no_stdev_and_no_signal() {
        let mut s = strategy(20, 2.0);
        for _ in 0..40 {
            assert_eq!(s.on_tick(&tick("ACME", 100)), None);
        }
    }

    #[test]
    fn z_exactly_at_entry_threshold_is_no_signal() {
        // entry_z = 0 makes the boundary exact: a price equal to the window
        // mean has z = 0, and the strict inequality must stay silent.
        let mut s = strategy(3, 0.0);
        assert_eq!(s.on_tick(&tick("ACME", 90)), None);
        assert_eq!(s.on_tick(&tick("ACME", 110)), None);
        // mean(90, 110, 100) = 100 and price = 100 → z = 0, no signal
        assert_eq!(s.on_tick(&tick("ACME", 100)), None);

        // One step above the mean clears the threshold.
        let mut s = strategy(3, 0.0);
        s.on_tick(&tick("ACME", 90));
        s.on_tick(&tick("ACME", 100));
        let signal = s.on_tick(&tick("ACME", 110)).expect("signal");
        assert_eq!(signal.side, Side::Sell);
    }

    #[test]
    fn moderate_move_scales_strength_below_one() {
        // A noisy window keeps the z-score near the threshold:
        // [100, 102, 98, 103] → mean 100.75, sample stdev ≈ 2.217, z ≈ 1.01
        let mut s = strategy(4, 1.0);
        s.on_tick(&tick("ACME", 100));
        s.on_tick(&tick("ACME", 102));
        s.on_tick(&tick("ACME", 98));
        let signal = s.on_tick(&tick("ACME", 103)).expect("signal");
        assert_eq!(signal.side, Side::Sell);
        assert!(signal.strength > 0.0 && signal.strength < 1.0);
    }

    #[test]
    fn windows_are_per_symbol() {
        let mut s = MeanReversion::new(
            "mean-reversion",
            ["AAA", "BBB"],
            MeanReversionConfig {
                window: 20,
                entry_z: 2.0,
            },
        );
        for _ in 0..19 {
            s.on_tick(&tick("AAA", 100));
        }
        // BBB's window is empty; its tick must not see AAA's history.
        assert_eq!(s.on_tick(&tick("BBB", 90)), None);
        // AAA's 20th tick still signals.
        assert!(s.on_tick(&tick("AAA", 90)).is_some());
    }

    #[test]
    fn reset_then_same_ticks_reproduce_same_signals() {
        let run = |s: &mut MeanReversion| -> Vec<Option<Signal>> {
            let mut out = Vec::new();
            for _ in 0..19 {
                out.push(s.on_tick(&tick("ACME", 100)));
            }
            out.push(s.on_tick(&tick("ACME", 90)));
            out
        };

        let mut s = strategy(20, 2.0);
        let first = run(&mut s);
        s.reset();
        let second = run(&mut s);

        assert_eq!(first, second);
        assert!(first[19].is_some());
    }

    #[test]
    fn non_positive_price_is_ignored() {
        let mut s = strategy(2, 2.0);
        let mut bad = tick("ACME", 0);
        bad.last = Micros::ZERO;
        assert_eq!(s.on_tick(&bad), None);
    }
}
