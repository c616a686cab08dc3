//! Power and current values
//!
//! A [`Power`] is stored as a current in amperes and converted to watts at a
//! fixed nominal single-phase voltage. All operations return new values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Nominal line voltage used for ampere/watt conversion
pub const VOLTAGE: f64 = 220.0;

/// An immutable power/current quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Power(f64);

impl Power {
    /// Zero power
    pub const NONE: Power = Power(0.0);

    /// Create a value from whole amperes
    pub fn of_amps(amps: i64) -> Self {
        Power(amps as f64)
    }

    /// Create a value from watts
    pub fn of_watts(watts: f64) -> Self {
        Power(watts / VOLTAGE)
    }

    pub fn in_watts(self) -> f64 {
        self.0 * VOLTAGE
    }

    pub const fn in_amps(self) -> f64 {
        self.0
    }

    /// Whole amperes, rounded down (`-2.3A` becomes `-3`)
    pub fn in_rounded_amps(self) -> i64 {
        self.0.floor() as i64
    }

    /// The same value rounded down to whole amperes
    pub fn to_amps_rounded(self) -> Self {
        Power::of_amps(self.in_rounded_amps())
    }

    pub fn negate(self) -> Self {
        Power(-self.0)
    }

    pub fn plus(self, other: Power) -> Self {
        Power(self.0 + other.0)
    }

    pub fn minus(self, other: Power) -> Self {
        Power(self.0 - other.0)
    }

    /// Divide by a sample count; dividing by zero yields [`Power::NONE`]
    pub fn divide_by(self, divisor: usize) -> Self {
        if divisor == 0 {
            return Power::NONE;
        }
        Power(self.0 / divisor as f64)
    }

    /// The smaller of the two values
    pub fn min(self, other: Power) -> Self {
        if self > other { other } else { self }
    }

    /// The larger of the two values
    pub fn max(self, other: Power) -> Self {
        if other > self { other } else { self }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0.0
    }

    /// Total order over the underlying value; NaN sorts as equal
    pub fn compare(&self, other: &Power) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

impl Add for Power {
    type Output = Power;

    fn add(self, rhs: Power) -> Power {
        self.plus(rhs)
    }
}

impl Sub for Power {
    type Output = Power;

    fn sub(self, rhs: Power) -> Power {
        self.minus(rhs)
    }
}

impl Neg for Power {
    type Output = Power;

    fn neg(self) -> Power {
        self.negate()
    }
}

impl std::iter::Sum for Power {
    fn sum<I: Iterator<Item = Power>>(iter: I) -> Power {
        iter.fold(Power::NONE, Power::plus)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}W", self.in_watts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_watts_and_amps() {
        for amps in [-13, -1, 0, 1, 5, 13, 32] {
            let roundtrip = Power::of_watts(Power::of_amps(amps).in_watts());
            assert!((roundtrip.in_amps() - amps as f64).abs() < 1e-9);
        }
        assert_eq!(Power::of_amps(5).in_watts(), 1100.0);
        assert!((Power::of_watts(700.0).in_amps() - 3.1818).abs() < 1e-3);
    }

    #[test]
    fn rounding_goes_down_to_whole_amps() {
        assert_eq!(Power::of_watts(700.0).in_rounded_amps(), 3);
        assert_eq!(Power::of_watts(1200.0).in_rounded_amps(), 5);
        assert_eq!(Power::of_watts(-1800.0).in_rounded_amps(), -9);
        assert_eq!(Power::of_watts(-500.0).in_rounded_amps(), -3);
        assert_eq!(Power::of_amps(-4).in_rounded_amps(), -4);
        assert_eq!(Power::of_watts(700.0).to_amps_rounded(), Power::of_amps(3));
    }

    #[test]
    fn arithmetic_is_non_destructive() {
        let a = Power::of_amps(6);
        let b = Power::of_amps(2);
        assert_eq!(a + b, Power::of_amps(8));
        assert_eq!(a - b, Power::of_amps(4));
        assert_eq!(-a, Power::of_amps(-6));
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
        assert_eq!(a, Power::of_amps(6));
    }

    #[test]
    fn ordering_follows_value() {
        assert!(Power::of_amps(3) > Power::of_amps(2));
        assert!(Power::of_watts(-1.0) < Power::NONE);
        assert!(Power::NONE.is_zero());
        assert!((-Power::NONE).is_zero());
        assert_eq!(
            Power::of_amps(1).compare(&Power::of_amps(2)),
            Ordering::Less
        );
    }

    #[test]
    fn sums_and_divides() {
        let total: Power = [1, 2, 3].into_iter().map(Power::of_amps).sum();
        assert_eq!(total, Power::of_amps(6));
        assert_eq!(total.divide_by(3), Power::of_amps(2));
        assert_eq!(total.divide_by(0), Power::NONE);
    }

    #[test]
    fn displays_watts() {
        assert_eq!(Power::of_amps(1).to_string(), "220W");
    }
}
