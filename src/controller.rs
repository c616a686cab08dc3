//! Charge current state machine
//!
//! A [`ChargeController`] captures the current charge current, the recent
//! power history and a pending stop intent. Each reading produces a new
//! controller value and at most one [`DeviceCommand`]. When the device
//! rejects that command the previous controller is kept, so the tracked
//! current always matches the last command the device accepted.

use crate::adjustment::Adjustment;
use crate::balance::PowerBalance;
use crate::controls::ChargeSettings;
use crate::device::{ChargingDevice, DeviceCommand};
use crate::error::Result;
use crate::power::Power;
use crate::window::SlidingWindow;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Immutable controller state
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeController {
    current: Power,
    window: SlidingWindow,
    settings: Arc<ChargeSettings>,
    trigger_time: Option<DateTime<Utc>>,
}

/// Outcome of planning a transition before any device interaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Controller to continue with once the command succeeded
    pub state: ChargeController,
    /// Adjustment that was finally decided on
    pub adjustment: Adjustment,
    /// Command to send, if any
    pub command: Option<DeviceCommand>,
}

impl ChargeController {
    /// A controller that is not charging
    pub fn init(settings: Arc<ChargeSettings>) -> Result<Self> {
        Self::for_current(Power::NONE, settings)
    }

    /// A controller seeded with the current the device reports
    pub fn for_current(current: Power, settings: Arc<ChargeSettings>) -> Result<Self> {
        let window = SlidingWindow::new(settings.adjustment_window())?;
        Ok(Self {
            current,
            window,
            settings,
            trigger_time: None,
        })
    }

    pub const fn current(&self) -> Power {
        self.current
    }

    pub const fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn settings(&self) -> &ChargeSettings {
        &self.settings
    }

    /// When we first intended to stop, if that intent is still pending
    pub const fn trigger_time(&self) -> Option<DateTime<Utc>> {
        self.trigger_time
    }

    pub fn is_charging(&self) -> bool {
        self.settings.is_charging(self.current)
    }

    /// The same controller with a stop intent recorded at `at`
    pub fn triggered_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            trigger_time: Some(at),
            ..self.clone()
        }
    }

    /// Process `balance` at the current wall-clock time
    pub async fn transition_for<D: ChargingDevice + ?Sized>(
        &self,
        balance: PowerBalance,
        device: &D,
    ) -> Self {
        self.transition_at(balance, device, Utc::now()).await
    }

    /// Process `balance` as if it arrived at `now`
    pub async fn transition_at<D: ChargingDevice + ?Sized>(
        &self,
        balance: PowerBalance,
        device: &D,
        now: DateTime<Utc>,
    ) -> Self {
        match device.charge_required().await {
            Ok(true) => {}
            Ok(false) => return self.fully_charged(device).await,
            Err(e) => {
                warn!(error = %e, "Could not determine whether charge is required");
                return self.clone();
            }
        }

        let transition = self.plan(balance, now);

        if let Some(command) = transition.command {
            info!(command = %command, adjustment = %transition.adjustment, "Issuing device command");
            if let Err(e) = command.issue(device).await {
                warn!(command = %command, error = %e, "Device command failed, keeping previous state");
                return self.clone();
            }
        }

        transition.state
    }

    async fn fully_charged<D: ChargingDevice + ?Sized>(&self, device: &D) -> Self {
        info!("Fully charged!");

        if self.is_charging() {
            if let Err(e) = device.stop().await {
                warn!(error = %e, "Stopping a fully charged device failed, keeping previous state");
                return self.clone();
            }
        }

        Self {
            current: Power::NONE,
            trigger_time: None,
            ..self.clone()
        }
    }

    /// Decide the next state and command for `balance` without touching the
    /// device
    pub fn plan(&self, balance: PowerBalance, now: DateTime<Utc>) -> Transition {
        let settings = &*self.settings;
        let candidate = settings.compute_adjustment(self.current, &balance);
        let new_window = self.window.add(balance);

        if candidate.is_unaltered() {
            return Transition {
                state: Self {
                    window: new_window,
                    trigger_time: None,
                    ..self.clone()
                },
                adjustment: candidate,
                command: None,
            };
        }

        debug!(candidate = %candidate, balance = %balance, "Candidate adjustment");

        // Decreases judge the history before this reading, increases include it.
        let mut alter_charge = if candidate.is_increase() {
            settings.should_increase_charge(&new_window, &candidate)
        } else {
            settings.should_decrease_charge(&self.window, &candidate, self.trigger_time, now)
        };

        let intend_to_switch_off = candidate.is_to_zero();
        let mut adjustment = candidate;

        if !alter_charge && intend_to_switch_off {
            if !adjustment.has_current(settings.min_current()) {
                info!("Skipping the adjustment but limiting to minimum charge");
            }
            adjustment = settings.within_range(adjustment);
            alter_charge = true;
        }

        let adjustment = if alter_charge {
            adjustment
        } else {
            Adjustment::none(self.current)
        };

        let new_current = settings.zero_or_within_range(adjustment.target());

        // Keep the first stop intent until charging resumes or actually stops.
        let trigger_time = if intend_to_switch_off && !new_current.is_zero() {
            Some(self.trigger_time.unwrap_or(now))
        } else {
            None
        };

        let state = Self {
            current: new_current,
            window: new_window,
            settings: Arc::clone(&self.settings),
            trigger_time,
        };

        let command = match (self.is_charging(), state.is_charging()) {
            (true, false) => Some(DeviceCommand::Stop),
            (false, true) => Some(DeviceCommand::Start(new_current)),
            _ if !adjustment.is_unaltered() => Some(DeviceCommand::Adjust(new_current)),
            _ => None,
        };

        Transition {
            state,
            adjustment,
            command,
        }
    }
}

impl fmt::Display for ChargeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChargeController(current={}A)", self.current.in_amps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn settings() -> Arc<ChargeSettings> {
        Arc::new(
            ChargeSettings::default()
                .with_min_current(Power::of_amps(3))
                .with_adjustment_window(3),
        )
    }

    #[test]
    fn starts_idle_with_empty_window() {
        let c = ChargeController::init(settings()).unwrap();
        assert_eq!(c.current(), Power::NONE);
        assert!(c.window().is_empty());
        assert!(!c.is_charging());
        assert!(c.trigger_time().is_none());
    }

    #[test]
    fn rejects_zero_window() {
        let s = Arc::new(ChargeSettings::default().with_adjustment_window(0));
        assert!(ChargeController::init(s).is_err());
    }

    #[test]
    fn unaltered_reading_only_updates_window() {
        let now = Utc::now();
        let c = ChargeController::init(settings())
            .unwrap()
            .triggered_at(now);
        let t = c.plan(PowerBalance::solar_only(Power::of_watts(200.0)), now);
        assert!(t.command.is_none());
        assert!(t.adjustment.is_unaltered());
        assert_eq!(t.state.window().len(), 3);
        assert!(t.state.trigger_time().is_none());
        assert_eq!(t.state.current(), Power::NONE);
    }

    #[test]
    fn holding_at_minimum_arms_trigger_without_command() {
        let now = Utc::now();
        let c = ChargeController::for_current(Power::of_amps(3), settings()).unwrap();
        let t = c.plan(
            PowerBalance::drawing(Power::of_watts(1000.0), Power::of_watts(1000.0)),
            now,
        );
        assert_eq!(t.state.current(), Power::of_amps(3));
        assert!(t.command.is_none());
        assert_eq!(t.state.trigger_time(), Some(now));

        let later = now + TimeDelta::minutes(1);
        let t2 = t.state.plan(
            PowerBalance::drawing(Power::of_watts(1000.0), Power::of_watts(1000.0)),
            later,
        );
        assert_eq!(t2.state.trigger_time(), Some(now));
    }

    #[test]
    fn display_shows_amps() {
        let c = ChargeController::for_current(Power::of_amps(6), settings()).unwrap();
        assert_eq!(c.to_string(), "ChargeController(current=6A)");
    }
}
