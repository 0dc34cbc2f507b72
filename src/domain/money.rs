use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A monetary value in integer cents.
///
/// All pricing arithmetic in the engine happens on whole cents; fractional
/// intermediate values (percentage discounts, tax rates) are computed with
/// `rust_decimal` and rounded half-away-from-zero back to cents. No floating
/// point anywhere on a money path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Subtracts, clamping at zero. Discounts never drive a total negative.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    /// `self * percent / 100`, rounded half-away-from-zero to whole cents.
    pub fn percentage(self, percent: Decimal) -> Self {
        let raw = Decimal::from(self.0) * percent / Decimal::from(100);
        Self(rounded_cents(raw))
    }

    /// Applies a fractional tax rate (e.g. `0.21`), rounded to whole cents.
    pub fn apply_rate(self, rate: Decimal) -> Self {
        let raw = Decimal::from(self.0) * rate;
        Self(rounded_cents(raw))
    }
}

fn rounded_cents(raw: Decimal) -> i64 {
    raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

// Arithmetic saturates at the i64 bounds; money paths never panic on
// overflow.
impl Add for Cents {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cents {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "usd"),
            Currency::Eur => write!(f, "eur"),
            Currency::Gbp => write!(f, "gbp"),
        }
    }
}
