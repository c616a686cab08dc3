//! Bounded history of recent power balances
//!
//! The window smooths noisy inverter readings before the controller acts on
//! them. It is never mutated in place: [`SlidingWindow::add`] returns a new
//! window.

use crate::balance::PowerBalance;
use crate::error::{HeliosError, Result};
use crate::power::Power;
use std::collections::VecDeque;
use std::fmt;

/// Fixed-capacity FIFO of [`PowerBalance`] snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow {
    entries: VecDeque<PowerBalance>,
    capacity: usize,
}

impl SlidingWindow {
    /// An empty window holding at most `capacity` readings
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HeliosError::validation(
                "adjustment_window",
                "Capacity must be greater than zero",
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// A window padded with neutral readings and ending in `balance`
    pub fn init(balance: PowerBalance, capacity: usize) -> Result<Self> {
        Ok(Self::new(capacity)?.add(balance))
    }

    /// A new window with `balance` appended, evicting the oldest entry when full
    ///
    /// The first reading added to an empty window is preceded by
    /// `capacity - 1` neutral entries so a single sample can't dominate the
    /// average.
    pub fn add(&self, balance: PowerBalance) -> SlidingWindow {
        let mut entries = self.entries.clone();

        if entries.is_empty() {
            entries.extend(std::iter::repeat_n(PowerBalance::NONE, self.capacity - 1));
        } else if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(balance);

        SlidingWindow {
            entries,
            capacity: self.capacity,
        }
    }

    /// Mean grid draw over all entries; surplus counts negative
    pub fn average_external_power(&self) -> Power {
        if self.entries.is_empty() {
            return Power::NONE;
        }

        self.entries
            .iter()
            .map(|b| b.spare_power().negate())
            .sum::<Power>()
            .divide_by(self.entries.len())
    }

    pub fn most_recent(&self) -> Option<&PowerBalance> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PowerBalance> {
        self.entries.iter()
    }
}

impl fmt::Display for SlidingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|b| format!("{:.1}", b.spare_power().in_watts()))
            .collect();
        write!(
            f,
            "SlidingWindow avg: {:.1}W, [{}]",
            self.average_external_power().in_watts(),
            entries.join(",")
        )
    }
}
