//! Instantaneous power balance between solar production and the grid

use crate::power::Power;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the installation currently exchanges power with the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "power", rename_all = "snake_case")]
pub enum GridExchange {
    /// No grid interaction known
    Neutral,
    /// Power pulled from the grid
    DrawingFromGrid(Power),
    /// Surplus pushed into the grid
    FeedingIntoGrid(Power),
}

/// Snapshot of solar production and grid exchange at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerBalance {
    solar_power: Power,
    exchange: GridExchange,
}

impl PowerBalance {
    /// No production, no exchange
    pub const NONE: PowerBalance = PowerBalance {
        solar_power: Power::NONE,
        exchange: GridExchange::Neutral,
    };

    /// Solar production without any grid data
    pub const fn solar_only(solar_power: Power) -> Self {
        Self {
            solar_power,
            exchange: GridExchange::Neutral,
        }
    }

    /// Solar production while drawing `external` from the grid
    pub const fn drawing(solar_power: Power, external: Power) -> Self {
        Self {
            solar_power,
            exchange: GridExchange::DrawingFromGrid(external),
        }
    }

    /// Solar production while feeding `feed_in` into the grid
    pub const fn feeding_in(solar_power: Power, feed_in: Power) -> Self {
        Self {
            solar_power,
            exchange: GridExchange::FeedingIntoGrid(feed_in),
        }
    }

    pub const fn solar_power(&self) -> Power {
        self.solar_power
    }

    pub const fn exchange(&self) -> GridExchange {
        self.exchange
    }

    /// Power currently pulled from the grid, zero unless drawing
    pub const fn external_power(&self) -> Power {
        match self.exchange {
            GridExchange::DrawingFromGrid(external) => external,
            GridExchange::Neutral | GridExchange::FeedingIntoGrid(_) => Power::NONE,
        }
    }

    pub fn uses_external_power(&self) -> bool {
        self.external_power().is_positive()
    }

    /// Surplus available for charging; negative while drawing from the grid
    pub fn spare_power(&self) -> Power {
        match self.exchange {
            GridExchange::Neutral => Power::NONE,
            GridExchange::DrawingFromGrid(external) => external.negate(),
            GridExchange::FeedingIntoGrid(feed_in) => feed_in,
        }
    }

    /// The balance we'd see if consumption changed by `delta`
    ///
    /// A positive delta consumes more, moving towards grid draw. A balanced
    /// result is reported as [`GridExchange::Neutral`].
    pub fn predict(&self, delta: Power) -> PowerBalance {
        if delta.is_zero() {
            return *self;
        }

        let spare = self.spare_power().minus(delta);

        let exchange = if spare.is_positive() {
            GridExchange::FeedingIntoGrid(spare)
        } else if spare.is_negative() {
            GridExchange::DrawingFromGrid(spare.negate())
        } else {
            GridExchange::Neutral
        };

        PowerBalance {
            solar_power: self.solar_power,
            exchange,
        }
    }
}

impl Default for PowerBalance {
    fn default() -> Self {
        PowerBalance::NONE
    }
}

impl fmt::Display for PowerBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let solar = self.solar_power.in_watts();
        match self.exchange {
            GridExchange::Neutral => write!(f, "Neutral(solar = {:.1}W)", solar),
            GridExchange::DrawingFromGrid(external) => write!(
                f,
                "Consuming(solar = {:.1}W, external = {:.1}W)",
                solar,
                external.in_watts()
            ),
            GridExchange::FeedingIntoGrid(feed_in) => write!(
                f,
                "FeedingIn(solar = {:.1}W, feeding = {:.1}W)",
                solar,
                feed_in.in_watts()
            ),
        }
    }
}
