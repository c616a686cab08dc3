//! Charging control policy for Helios
//!
//! [`ChargeSettings`] holds the tunable limits and owns the decision rules:
//! how far to move the charge current for a given power balance, and whether
//! the sliding window justifies acting on that move.

use crate::adjustment::Adjustment;
use crate::balance::PowerBalance;
use crate::error::{HeliosError, Result};
use crate::power::Power;
use crate::window::SlidingWindow;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

const DEFAULT_MIN_CURRENT_AMPS: i64 = 5;
const DEFAULT_MAX_CURRENT_AMPS: i64 = 13;
const DEFAULT_ADJUSTMENT_WINDOW: usize = 5;
const DEFAULT_EXCEED_CHARGE_WINDOW_MINUTES: i64 = 10;

/// Tunable charging policy
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeSettings {
    /// Lowest current the device will charge with
    min_current: Power,
    /// Upper bound for currents sent to the device
    max_current: Power,
    /// Grid draw we accept to keep charging near the minimum
    accepted_external_consumption: Power,
    /// Number of readings smoothed before acting
    adjustment_window: usize,
    /// How long to keep charging after deciding to stop
    exceed_charge_window: TimeDelta,
}

impl Default for ChargeSettings {
    fn default() -> Self {
        Self {
            min_current: Power::of_amps(DEFAULT_MIN_CURRENT_AMPS),
            max_current: Power::of_amps(DEFAULT_MAX_CURRENT_AMPS),
            accepted_external_consumption: Power::NONE,
            adjustment_window: DEFAULT_ADJUSTMENT_WINDOW,
            exceed_charge_window: TimeDelta::minutes(DEFAULT_EXCEED_CHARGE_WINDOW_MINUTES),
        }
    }
}

impl ChargeSettings {
    /// Create validated settings
    pub fn new(
        min_current: Power,
        max_current: Power,
        adjustment_window: usize,
        accepted_external_consumption: Power,
        exceed_charge_window: TimeDelta,
    ) -> Result<Self> {
        let settings = Self {
            min_current,
            max_current,
            accepted_external_consumption,
            adjustment_window,
            exceed_charge_window,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        if !self.min_current.is_positive() {
            return Err(HeliosError::validation(
                "min_current",
                "Must be greater than zero",
            ));
        }
        if self.min_current > self.max_current {
            return Err(HeliosError::validation(
                "max_current",
                "Must not be below the minimum current",
            ));
        }
        if self.adjustment_window == 0 {
            return Err(HeliosError::validation(
                "adjustment_window",
                "Must be greater than zero",
            ));
        }
        if self.accepted_external_consumption.is_negative() {
            return Err(HeliosError::validation(
                "accepted_external_consumption",
                "Must not be negative",
            ));
        }
        if self.exceed_charge_window < TimeDelta::zero() {
            return Err(HeliosError::validation(
                "exceed_charge_window",
                "Must not be negative",
            ));
        }
        Ok(())
    }

    pub fn with_min_current(self, min_current: Power) -> Self {
        Self {
            min_current,
            ..self
        }
    }

    pub fn with_max_current(self, max_current: Power) -> Self {
        Self {
            max_current,
            ..self
        }
    }

    pub fn with_adjustment_window(self, adjustment_window: usize) -> Self {
        Self {
            adjustment_window,
            ..self
        }
    }

    pub fn with_accepted_external_consumption(self, accepted: Power) -> Self {
        Self {
            accepted_external_consumption: accepted,
            ..self
        }
    }

    pub fn with_exceed_charge_window(self, exceed_charge_window: TimeDelta) -> Self {
        Self {
            exceed_charge_window,
            ..self
        }
    }

    pub const fn min_current(&self) -> Power {
        self.min_current
    }

    pub const fn max_current(&self) -> Power {
        self.max_current
    }

    pub const fn accepted_external_consumption(&self) -> Power {
        self.accepted_external_consumption
    }

    pub const fn adjustment_window(&self) -> usize {
        self.adjustment_window
    }

    pub const fn exceed_charge_window(&self) -> TimeDelta {
        self.exceed_charge_window
    }

    /// Whether `current` is high enough to count as charging
    pub fn is_charging(&self, current: Power) -> bool {
        current >= self.min_current
    }

    pub fn is_below_min_current(&self, current: Power) -> bool {
        self.min_current > current
    }

    pub fn implies_charge_state_change(&self, adjustment: &Adjustment) -> bool {
        adjustment.passes_threshold(self.min_current)
    }

    /// Compute the move from `current` that the balance supports
    ///
    /// Spare power is used as is when it sustains at least the minimum
    /// current. Otherwise up to `accepted_external_consumption` of grid draw
    /// is added one ampere at a time; if the minimum is still out of reach the
    /// adjustment goes to zero.
    pub fn compute_adjustment(&self, current: Power, balance: &PowerBalance) -> Adjustment {
        let mut candidate = Adjustment::with_current(current)
            .with_adjustment(balance.spare_power().to_amps_rounded());

        if !self.is_below_min_current(candidate.target()) {
            return candidate.build().with_max(self.max_current);
        }

        let step = Power::of_amps(1);
        let mut accepted = Power::NONE;

        while self.accepted_external_consumption > accepted
            && self.is_below_min_current(candidate.target())
        {
            accepted = accepted.plus(step);
            candidate = candidate.and_adjustment(step);
        }

        if self.is_below_min_current(candidate.target()) {
            candidate.to_zero()
        } else {
            candidate.build().with_max(self.max_current)
        }
    }

    /// Below the minimum becomes zero, above the maximum is capped
    pub fn zero_or_within_range(&self, current: Power) -> Power {
        if self.is_below_min_current(current) {
            Power::NONE
        } else {
            current.min(self.max_current)
        }
    }

    pub fn within_range(&self, adjustment: Adjustment) -> Adjustment {
        adjustment.within_range(self.min_current, self.max_current)
    }

    /// Whether an increase should be applied given the window including the
    /// newest reading
    ///
    /// Starting from zero is refused while the window's average grid draw
    /// exceeds the accepted consumption. Raising an active charge needs the
    /// average to stay below it, so a single surplus sample can't ramp up.
    pub fn should_increase_charge(&self, window: &SlidingWindow, adjustment: &Adjustment) -> bool {
        let average = window.average_external_power();

        if adjustment.is_from_zero() {
            if average > self.accepted_external_consumption {
                info!(
                    average = %average,
                    samples = window.len(),
                    accepted = %self.accepted_external_consumption,
                    "Not starting as average grid draw exceeds the acceptable external power"
                );
                return false;
            }
            return true;
        }

        if average < self.accepted_external_consumption {
            return true;
        }

        debug!(
            average = %average,
            samples = window.len(),
            "Not increasing as the window shows no sustained surplus"
        );
        false
    }

    /// Whether a decrease should be applied given the window before the
    /// newest reading
    ///
    /// Only decreases to zero are ever deferred: during the grace period
    /// after `trigger_time` charging continues.
    pub fn should_decrease_charge(
        &self,
        window: &SlidingWindow,
        adjustment: &Adjustment,
        trigger_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !adjustment.is_to_zero() {
            return true;
        }

        let elapsed = trigger_time.map_or(TimeDelta::zero(), |t| now - t);

        if elapsed < self.exceed_charge_window {
            info!(
                elapsed_secs = elapsed.num_seconds(),
                window_secs = self.exceed_charge_window.num_seconds(),
                "Not decreasing charge as the minimum charge time has not been exceeded"
            );
            return false;
        }

        let average = window.average_external_power();

        if average > self.accepted_external_consumption {
            info!(window = %window, "Adjusting due to sustained grid draw");
            return true;
        }

        if self.is_below_min_current(adjustment.target()) {
            return true;
        }

        info!(
            average = %average,
            samples = window.len(),
            accepted = %self.accepted_external_consumption,
            "Not adjusting as average does not exceed the acceptable external power"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watts(w: f64) -> Power {
        Power::of_watts(w)
    }

    fn amps(a: i64) -> Power {
        Power::of_amps(a)
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = ChargeSettings::default();
        assert_eq!(s.min_current(), amps(5));
        assert_eq!(s.max_current(), amps(13));
        assert_eq!(s.adjustment_window(), 5);
        assert_eq!(s.accepted_external_consumption(), Power::NONE);
        assert_eq!(s.exceed_charge_window(), TimeDelta::minutes(10));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_settings() {
        let base = ChargeSettings::default();
        assert!(base.clone().with_adjustment_window(0).validate().is_err());
        assert!(base.clone().with_min_current(amps(14)).validate().is_err());
        assert!(base.clone().with_min_current(Power::NONE).validate().is_err());
        assert!(
            base.clone()
                .with_accepted_external_consumption(watts(-1.0))
                .validate()
                .is_err()
        );
        assert!(
            ChargeSettings::new(amps(6), amps(16), 0, Power::NONE, TimeDelta::zero()).is_err()
        );
    }

    #[test]
    fn with_setters_leave_original_untouched() {
        let base = ChargeSettings::default();
        let changed = base.clone().with_max_current(amps(16));
        assert_eq!(base.max_current(), amps(13));
        assert_eq!(changed.max_current(), amps(16));
        assert_eq!(changed.min_current(), base.min_current());
    }

    #[test]
    fn accepts_grid_draw_only_up_to_the_configured_budget() {
        let pv = PowerBalance::drawing(watts(2500.0), watts(1800.0));
        let settings =
            ChargeSettings::default().with_accepted_external_consumption(watts(1000.0));

        let adjustment = settings.compute_adjustment(amps(7), &pv);
        assert_eq!(adjustment.delta(), amps(-7));
        assert!(adjustment.is_to_zero());

        let adjustment = settings.compute_adjustment(amps(8), &pv);
        assert_eq!(adjustment.delta(), amps(-8));
        assert!(adjustment.is_to_zero());

        let adjustment = settings.compute_adjustment(amps(9), &pv);
        assert_eq!(adjustment.delta().in_rounded_amps(), -4);
        assert!(!adjustment.is_to_zero());
    }

    #[test]
    fn jumps_straight_to_minimal_charge_level() {
        let settings = ChargeSettings::default();

        let pv = PowerBalance::feeding_in(watts(1200.0), watts(1200.0));
        assert_eq!(settings.compute_adjustment(Power::NONE, &pv).delta(), amps(5));

        let pv = PowerBalance::feeding_in(watts(2000.0), watts(1200.0));
        assert_eq!(settings.compute_adjustment(Power::NONE, &pv).delta(), amps(5));
    }

    #[test]
    fn decreases_to_minimal_charge_level_to_avoid_consumption() {
        let pv = PowerBalance::drawing(watts(2500.0), watts(500.0));
        let adjustment = ChargeSettings::default().compute_adjustment(amps(8), &pv);
        assert_eq!(adjustment.delta(), amps(-3));
    }

    #[test]
    fn reaches_minimum_by_accepting_some_consumption() {
        let pv = PowerBalance::drawing(watts(2500.0), watts(1500.0));
        let adjustment = ChargeSettings::default()
            .with_accepted_external_consumption(watts(1000.0))
            .compute_adjustment(amps(8), &pv);
        assert_eq!(adjustment.delta(), amps(-3));
    }

    #[test]
    fn caps_increases_at_max_current() {
        let pv = PowerBalance::feeding_in(watts(6000.0), watts(5000.0));
        let adjustment = ChargeSettings::default().compute_adjustment(amps(10), &pv);
        assert_eq!(adjustment.target(), amps(13));
        let at_max = ChargeSettings::default().compute_adjustment(amps(13), &pv);
        assert!(at_max.is_unaltered());
    }

    #[test]
    fn no_power_from_zero_stays_at_zero() {
        let pv = PowerBalance::solar_only(watts(200.0));
        let adjustment = ChargeSettings::default().compute_adjustment(Power::NONE, &pv);
        assert!(adjustment.is_unaltered());
    }

    #[test]
    fn zero_or_within_range_snaps() {
        let s = ChargeSettings::default();
        assert_eq!(s.zero_or_within_range(amps(4)), Power::NONE);
        assert_eq!(s.zero_or_within_range(amps(5)), amps(5));
        assert_eq!(s.zero_or_within_range(amps(20)), amps(13));
        assert!(s.is_charging(amps(5)));
        assert!(!s.is_charging(amps(4)));
    }

    #[test]
    fn charge_state_change_is_threshold_crossing() {
        let s = ChargeSettings::default();
        let stop = Adjustment::with_current(amps(6)).to_zero();
        let lower = Adjustment::with_current(amps(8))
            .with_adjustment(amps(-2))
            .build();
        assert!(s.implies_charge_state_change(&stop));
        assert!(!s.implies_charge_state_change(&lower));
    }

    #[test]
    fn refuses_to_start_into_sustained_grid_draw() {
        let s = ChargeSettings::default();
        let draw = PowerBalance::drawing(watts(1000.0), watts(600.0));
        let window = SlidingWindow::init(draw, 2).unwrap().add(draw);
        let start = Adjustment::with_current(Power::NONE)
            .with_adjustment(amps(5))
            .build();
        assert!(!s.should_increase_charge(&window, &start));

        let feed = PowerBalance::feeding_in(watts(2000.0), watts(1200.0));
        let window = SlidingWindow::init(feed, 2).unwrap();
        assert!(s.should_increase_charge(&window, &start));
    }

    #[test]
    fn raising_active_charge_needs_window_surplus() {
        let s = ChargeSettings::default();
        let raise = Adjustment::with_current(amps(6))
            .with_adjustment(amps(1))
            .build();
        let draw = PowerBalance::drawing(watts(2500.0), watts(300.0));
        let feed = PowerBalance::feeding_in(watts(2500.0), watts(300.0));

        let mixed = SlidingWindow::init(draw, 2).unwrap().add(feed);
        assert!(!s.should_increase_charge(&mixed, &raise));

        let surplus = mixed.add(feed);
        assert!(s.should_increase_charge(&surplus, &raise));
    }

    #[test]
    fn defers_stop_during_grace_period() {
        let s = ChargeSettings::default();
        let window = SlidingWindow::new(5).unwrap();
        let stop = Adjustment::with_current(amps(6)).to_zero();
        let now = Utc::now();

        assert!(!s.should_decrease_charge(&window, &stop, None, now));
        assert!(!s.should_decrease_charge(
            &window,
            &stop,
            Some(now - TimeDelta::minutes(9)),
            now
        ));
        assert!(s.should_decrease_charge(
            &window,
            &stop,
            Some(now - TimeDelta::minutes(10)),
            now
        ));
    }

    #[test]
    fn partial_decreases_are_never_deferred() {
        let s = ChargeSettings::default();
        let window = SlidingWindow::new(5).unwrap();
        let lower = Adjustment::with_current(amps(8))
            .with_adjustment(amps(-3))
            .build();
        assert!(s.should_decrease_charge(&window, &lower, None, Utc::now()));
    }
}
