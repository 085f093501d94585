//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Used for point values and the multiplier factors applied to them.
//! Canonical string formatting (no exponent notation) is what the database
//! stores; intermediate arithmetic keeps full precision.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point numeric type for points and multipliers.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to JSON number (not string) by default.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Points(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Points {
    /// Create from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Points(value)
    }

    /// Create from an integer mantissa and a decimal scale (e.g. `(125, 2)` is 1.25).
    pub fn from_parts(mantissa: i64, scale: u32) -> Self {
        Points(RustDecimal::new(mantissa, scale))
    }

    /// Create from a whole number of points.
    pub fn from_i64(value: i64) -> Self {
        Points(RustDecimal::from(value))
    }

    /// Parse losslessly from a string.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Points)
    }

    /// Format as a canonical string (no exponent notation, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Points(RustDecimal::ZERO)
    }

    /// The multiplicative identity (1).
    pub fn one() -> Self {
        Points(RustDecimal::ONE)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Round to two decimal places, half away from zero.
    ///
    /// Applied exactly once, at the storage edge. Intermediate factors are
    /// never rounded.
    pub fn round2(&self) -> Self {
        Points(
            self.0
                .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Points {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Points {
    fn from(value: RustDecimal) -> Self {
        Points(value)
    }
}

impl From<Points> for RustDecimal {
    fn from(value: Points) -> Self {
        value.0
    }
}

impl std::ops::Add for Points {
    type Output = Points;

    fn add(self, rhs: Points) -> Points {
        Points(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Points {
    type Output = Points;

    fn sub(self, rhs: Points) -> Points {
        Points(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Points {
    type Output = Points;

    fn mul(self, rhs: Points) -> Points {
        Points(self.0 * rhs.0)
    }
}

impl std::ops::Div for Points {
    type Output = Points;

    fn div(self, rhs: Points) -> Points {
        Points(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Points {
    type Output = Points;

    fn neg(self) -> Points {
        Points(-self.0)
    }
}

impl std::iter::Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Points {
        iter.fold(Points::zero(), |acc, p| acc + p)
    }
}
