//! Fixed-point money type.
//!
//! All prices and cash amounts in this system use a 1e-6 (micros)
//! fixed-point representation stored as `i64`.  Using raw `i64` for money is
//! error-prone: it allows accidental arithmetic with unrelated integers
//! (quantities, ids, basis points) without any compile-time signal.
//!
//! `Micros` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Micros` with unrelated `i64` values in arithmetic.
//!
//! 1 USD = 1_000_000 micros.  Non-monetary quantities (share counts, order
//! ids, basis points) remain plain `i64` and are never implicitly
//! convertible.
//!
//! Serde encodes `Micros` as a decimal string with six fractional digits
//! (`"90.045000"`), matching the `numeric(18,6)` persistence scale.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount at 1e-6 scale (micros).
///
/// 1 USD = `Micros::new(1_000_000)`.
///
/// Use [`Micros::new`] for explicit construction from a raw micros value and
/// [`Micros::from_units`] for whole currency units; use [`Micros::raw`] to
/// extract the underlying `i64` when crossing layer boundaries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    /// Zero monetary amount.
    pub const ZERO: Micros = Micros(0);

    /// Maximum representable value.
    pub const MAX: Micros = Micros(i64::MAX);

    /// Construct a `Micros` from a raw `i64` at 1e-6 scale.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Construct from whole currency units (`from_units(100)` = $100).
    ///
    /// Saturates at the representable range; whole-unit constants in config
    /// and tests are nowhere near it.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units.saturating_mul(1_000_000))
    }

    /// Extract the underlying raw `i64`.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Checked addition.
    #[inline]
    pub fn checked_add(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_add(rhs.0).map(Micros)
    }

    /// Checked subtraction.
    #[inline]
    pub fn checked_sub(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_sub(rhs.0).map(Micros)
    }

    /// Saturating addition — clamps at the representable range.
    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction — clamps at the representable range.
    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    /// Multiply a per-unit price by an integer share quantity.
    ///
    /// Returns `None` if the result does not fit `i64`.  Callers MUST handle
    /// `None` explicitly: overflow in a trade value calculation is a critical
    /// error, not a routine saturation.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        let wide = (self.0 as i128) * (qty as i128);
        if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
            None
        } else {
            Some(Micros(wide as i64))
        }
    }

    /// Absolute value.  `Micros(i64::MIN).abs()` saturates to `Micros::MAX`.
    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    /// Sign: `1`, `0`, or `-1` as a plain integer (not a Micros value).
    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    /// `true` if this amount is strictly positive.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `true` if this amount is strictly negative.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Micros)
// ---------------------------------------------------------------------------

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Display / FromStr
// ---------------------------------------------------------------------------

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0 / 1_000_000;
        let frac = (self.0 % 1_000_000).abs();
        // When |value| < $1 and value is negative, units truncates to 0,
        // losing the sign.  Emit "-0" explicitly in that case.
        if self.0 < 0 && units == 0 {
            write!(f, "-{units}.{frac:06}")
        } else {
            write!(f, "{units}.{frac:06}")
        }
    }
}

/// Error produced when parsing a decimal string into [`Micros`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMicrosError {
    /// Empty or sign-only input.
    Empty,
    /// A character outside `[0-9]` appeared in the integer or fraction part.
    InvalidDigit,
    /// More than six fractional digits.
    TooManyDecimals,
    /// The value does not fit the `i64` micros range.
    OutOfRange,
}

impl fmt::Display for ParseMicrosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty decimal string"),
            Self::InvalidDigit => write!(f, "invalid digit in decimal string"),
            Self::TooManyDecimals => write!(f, "more than 6 fractional digits"),
            Self::OutOfRange => write!(f, "value out of i64 micros range"),
        }
    }
}

impl std::error::Error for ParseMicrosError {}

impl FromStr for Micros {
    type Err = ParseMicrosError;

    /// Parse a plain decimal string (`"90.045"`, `"-0.5"`, `"100"`) into
    /// micros.  At most six fractional digits; no exponents, no separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseMicrosError::Empty);
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ParseMicrosError::InvalidDigit);
        }
        if frac_part.len() > 6 {
            return Err(ParseMicrosError::TooManyDecimals);
        }

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseMicrosError::OutOfRange)?
        };
        let mut frac: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| ParseMicrosError::OutOfRange)?
        };
        for _ in frac_part.len()..6 {
            frac *= 10;
        }

        let raw = units
            .checked_mul(1_000_000)
            .and_then(|v| v.checked_add(frac))
            .ok_or(ParseMicrosError::OutOfRange)?;

        Ok(Micros(if negative { -raw } else { raw }))
    }
}

// ---------------------------------------------------------------------------
// Serde (decimal string, scale 6)
// ---------------------------------------------------------------------------

impl Serialize for Micros {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Micros {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
