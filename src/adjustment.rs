//! Proposed changes to the charge current

use crate::power::Power;
use std::fmt;

/// A proposed move from a current charge current to a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    current: Power,
    delta: Power,
}

impl Adjustment {
    /// An adjustment that keeps `current` as is
    pub const fn none(current: Power) -> Self {
        Self {
            current,
            delta: Power::NONE,
        }
    }

    /// Start building an adjustment away from `current`
    pub const fn with_current(current: Power) -> AdjustmentBuilder {
        AdjustmentBuilder {
            current,
            delta: Power::NONE,
        }
    }

    pub const fn current(&self) -> Power {
        self.current
    }

    pub const fn delta(&self) -> Power {
        self.delta
    }

    pub fn target(&self) -> Power {
        self.current.plus(self.delta)
    }

    pub fn has_current(&self, power: Power) -> bool {
        self.current == power
    }

    pub fn is_unaltered(&self) -> bool {
        self.delta.is_zero()
    }

    pub fn is_increase(&self) -> bool {
        self.delta.is_positive()
    }

    /// Whether the target is exactly zero
    pub fn is_to_zero(&self) -> bool {
        self.current == self.delta.negate()
    }

    pub fn is_from_zero(&self) -> bool {
        self.current.is_zero()
    }

    /// Whether current and target lie on different sides of `threshold`
    pub fn passes_threshold(&self, threshold: Power) -> bool {
        (self.current > threshold) != (self.target() > threshold)
    }

    /// Cap the target at `max`
    pub fn with_max(self, max: Power) -> Adjustment {
        if self.target() > max {
            self.to_target(max)
        } else {
            self
        }
    }

    /// Clamp the target into `[min, max]`
    pub fn within_range(self, min: Power, max: Power) -> Adjustment {
        let target = self.target();

        if min > target {
            return self.to_target(min);
        }

        if target > max {
            return self.to_target(max);
        }

        self
    }

    fn to_target(self, target: Power) -> Adjustment {
        Adjustment {
            current: self.current,
            delta: target.minus(self.current),
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.delta.is_positive() { "+" } else { "" };
        write!(
            f,
            "{}A --({}{}A)--> {}A",
            self.current.in_amps(),
            sign,
            self.delta.in_amps(),
            self.target().in_amps()
        )
    }
}

/// Accumulates deltas before producing an [`Adjustment`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentBuilder {
    current: Power,
    delta: Power,
}

impl AdjustmentBuilder {
    /// Add `power` to the accumulated delta
    pub fn and_adjustment(self, power: Power) -> Self {
        Self {
            current: self.current,
            delta: self.delta.plus(power),
        }
    }

    /// Replace the accumulated delta
    pub const fn with_adjustment(self, power: Power) -> Self {
        Self {
            current: self.current,
            delta: power,
        }
    }

    pub fn target(&self) -> Power {
        self.current.plus(self.delta)
    }

    /// Finish with the delta rounded down to whole amperes
    pub fn to_rounded_amps(self) -> Adjustment {
        Adjustment {
            current: self.current,
            delta: self.delta.to_amps_rounded(),
        }
    }

    /// Finish with a delta that ends at zero
    pub fn to_zero(self) -> Adjustment {
        Adjustment {
            current: self.current,
            delta: self.current.negate(),
        }
    }

    pub const fn build(self) -> Adjustment {
        Adjustment {
            current: self.current,
            delta: self.delta,
        }
    }
}
