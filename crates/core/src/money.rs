//! Monetary amounts in the smallest currency unit.
//!
//! Single currency only; amounts are integer cents so line totals are exact
//! and reproducible on replay.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Basis points in one whole (100%).
pub const BASIS_POINTS: i64 = 10_000;

/// Amount in cents. May be negative (refunds, net figures).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `self × quantity`, saturating.
    pub fn times(self, quantity: i64) -> Money {
        Money(self.0.saturating_mul(quantity))
    }

    /// `self × quantity × (1 − bp/10000)`, rounded half away from zero to the cent.
    pub fn extended(self, quantity: i64, discount_bp: u32) -> Money {
        let gross = self.0 as i128 * quantity as i128;
        let keep = BASIS_POINTS as i128 - discount_bp as i128;
        Money(round_div(gross * keep, BASIS_POINTS as i128))
    }

    /// `self × (1 − bp/10000)`, rounded half away from zero to the cent.
    pub fn percent_off(self, bp: u32) -> Money {
        self.extended(1, bp)
    }
}

fn round_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let q = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}
