//! Charging device capability
//!
//! The controller only talks to a charger or vehicle through
//! [`ChargingDevice`]. Every call may fail; failures come back as
//! [`HeliosError`](crate::error::HeliosError) values rather than panics.

use crate::error::Result;
use crate::power::Power;
use std::fmt;

/// Capability the controller needs from the thing being charged
#[async_trait::async_trait]
pub trait ChargingDevice: Send + Sync {
    /// Liveness probe performed once at startup
    async fn heartbeat(&self) -> Result<()>;

    /// Whether the device still wants energy; `false` means full
    async fn charge_required(&self) -> Result<bool>;

    /// Current the device is charging with right now
    async fn current_charge_power(&self) -> Result<Power>;

    async fn start(&self, current: Power) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn adjust(&self, current: Power) -> Result<()>;
}

/// The single command a controller transition sends to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    Start(Power),
    Stop,
    Adjust(Power),
}

impl DeviceCommand {
    /// Send this command to `device`
    pub async fn issue<D: ChargingDevice + ?Sized>(&self, device: &D) -> Result<()> {
        match *self {
            DeviceCommand::Start(current) => device.start(current).await,
            DeviceCommand::Stop => device.stop().await,
            DeviceCommand::Adjust(current) => device.adjust(current).await,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Start(current) => write!(f, "start({}A)", current.in_rounded_amps()),
            DeviceCommand::Stop => write!(f, "stop"),
            DeviceCommand::Adjust(current) => {
                write!(f, "adjust({}A)", current.in_rounded_amps())
            }
        }
    }
}
