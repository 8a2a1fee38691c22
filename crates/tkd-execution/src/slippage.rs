//! Slippage arithmetic, exact in micros.

use tkd_schemas::{Micros, Side};

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// Fill price for a market order against `reference`:
/// buys pay `reference · (1 + bps·1e-4)`, sells receive
/// `reference · (1 − bps·1e-4)`.  Rounded half-up to the nearest micro.
pub fn apply_slippage(reference: Micros, side: Side, slippage_bps: i64) -> Micros {
    let factor = match side {
        Side::Buy => 10_000 + slippage_bps,
        Side::Sell => 10_000 - slippage_bps,
    };
    let scaled = (reference.raw() as i128) * (factor as i128);
    Micros::new(i128_to_i64_clamp((scaled + 5_000) / 10_000))
}
