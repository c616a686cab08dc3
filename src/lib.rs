//! # Helios - Solar-Following EV Charge Controller
//!
//! Adjusts the charge current of an electric vehicle so that it follows the
//! surplus of a photovoltaic installation, drawing as little as possible from
//! the grid while avoiding rapid start/stop cycling.
//!
//! ## Architecture
//!
//! - `power`: power quantities stored in amperes at a fixed 220 V
//! - `balance`: solar production and grid exchange at one instant
//! - `window`: fixed-size history of recent readings
//! - `adjustment`: proposed current changes and their clamping
//! - `controls`: charging policy and the hysteresis rules
//! - `controller`: the charge current state machine
//! - `device`: the capability a charger or vehicle must offer
//! - `driver`: single-consumer reading loop owning the controller
//! - `inverter`: SMA inverter readings and polling
//! - `vehicle`: Tesla owner API device
//! - `config`: YAML configuration and validation
//! - `logging`: structured logging and tracing

pub mod adjustment;
pub mod balance;
pub mod config;
pub mod controller;
pub mod controls;
pub mod device;
pub mod driver;
pub mod error;
pub mod inverter;
pub mod logging;
pub mod power;
#[cfg(feature = "tesla")]
pub mod vehicle;
pub mod window;

// Re-export commonly used types
pub use adjustment::Adjustment;
pub use balance::{GridExchange, PowerBalance};
pub use config::Config;
pub use controller::{ChargeController, Transition};
pub use controls::ChargeSettings;
pub use device::{ChargingDevice, DeviceCommand};
pub use driver::{ChargeDriver, ControllerSnapshot};
pub use error::{HeliosError, Result};
pub use power::Power;
pub use window::SlidingWindow;
