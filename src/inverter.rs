//! SMA inverter readings
//!
//! The inverter's dashboard endpoint reports solar production, grid draw and
//! feed-in. [`parse_dashboard`] turns that document into a [`PowerBalance`];
//! [`poll_power`] feeds readings from any [`PowerSource`] into the driver
//! queue at a fixed interval.

use crate::balance::PowerBalance;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::power::Power;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};

/// Current solar production
const SOLAR_POWER_KEY: &str = "6100_40263F00";
/// Power drawn from the grid
const EXTERNAL_POWER_KEY: &str = "6100_40463700";
/// Power fed into the grid
const FEED_IN_POWER_KEY: &str = "6100_40463600";

/// Something that can report the current power balance
#[async_trait::async_trait]
pub trait PowerSource: Send + Sync {
    async fn read_balance(&self) -> Result<PowerBalance>;
}

/// Extract a [`PowerBalance`] from a `getDashValues.json` document
///
/// Values reported as `null` (the inverter does so at night) count as 0 W.
pub fn parse_dashboard(document: &Value) -> Result<PowerBalance> {
    let device = document
        .get("result")
        .and_then(Value::as_object)
        .and_then(|devices| devices.values().next())
        .ok_or_else(|| HeliosError::inverter("Dashboard contains no device result"))?;

    let solar = read_watts(device, SOLAR_POWER_KEY)?;
    let external = read_watts(device, EXTERNAL_POWER_KEY)?;
    let feed_in = read_watts(device, FEED_IN_POWER_KEY)?;

    let balance = if external.is_zero() {
        PowerBalance::feeding_in(solar, feed_in)
    } else {
        PowerBalance::drawing(solar, external)
    };

    Ok(balance)
}

fn read_watts(device: &Value, key: &str) -> Result<Power> {
    let value = device
        .get(key)
        .and_then(|v| v.get("1"))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("val"))
        .ok_or_else(|| HeliosError::inverter(format!("Missing value for {}", key)))?;

    let watts = match value {
        Value::Null => 0.0,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| HeliosError::inverter(format!("Unreadable value for {}", key)))?,
        other => {
            return Err(HeliosError::inverter(format!(
                "Unexpected value for {}: {}",
                key, other
            )));
        }
    };

    if watts < 0.0 {
        return Err(HeliosError::inverter(format!(
            "Negative value for {}: {}",
            key, watts
        )));
    }

    Ok(Power::of_watts(watts))
}

/// Read from `source` every `period` and publish into `sender`
///
/// Failed reads are logged and skipped. Returns once `shutdown` flips to
/// `true` or no consumer is left.
pub async fn poll_power<S: PowerSource + ?Sized>(
    source: &S,
    period: Duration,
    sender: broadcast::Sender<PowerBalance>,
    mut shutdown: watch::Receiver<bool>,
) {
    let logger = get_logger("inverter");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    logger.info(&format!("Polling inverter every {} seconds", period.as_secs()));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match source.read_balance().await {
                    Ok(balance) => {
                        logger.info(&format!("Current power: {}", balance));
                        if sender.send(balance).is_err() {
                            logger.info("No reading consumer left, stopping poller");
                            return;
                        }
                    }
                    Err(e) => logger.warn(&format!("Inverter read failed: {}", e)),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    logger.info("Inverter poller shutting down");
                    return;
                }
            }
        }
    }
}

/// HTTP client for an SMA inverter on the local network
#[cfg(feature = "sma")]
pub struct SmaClient {
    client: reqwest::Client,
    endpoint: String,
    logger: crate::logging::StructuredLogger,
}

#[cfg(feature = "sma")]
impl SmaClient {
    /// Client for the inverter at `host`
    pub fn new(config: &crate::config::InverterConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(HeliosError::validation(
                "inverter.host",
                "Host cannot be empty",
            ));
        }
        Self::with_endpoint(
            format!("https://{}/dyn/getDashValues.json", config.host),
            config,
        )
    }

    /// Client for an explicit dashboard URL
    pub fn with_endpoint(endpoint: String, config: &crate::config::InverterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        let logger = crate::logging::get_logger_with_context(
            crate::logging::LogContext::new("inverter")
                .with_device(&config.host)
                .with_field("endpoint", endpoint.clone()),
        );
        Ok(Self {
            client,
            endpoint,
            logger,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "sma")]
#[async_trait::async_trait]
impl PowerSource for SmaClient {
    async fn read_balance(&self) -> Result<PowerBalance> {
        let resp = self.client.get(&self.endpoint).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HeliosError::inverter(format!(
                "Dashboard request failed with {}",
                status
            )));
        }
        let document: Value = resp.json().await?;
        self.logger
            .debug(&format!("PV data lookup returned: {}", document));
        parse_dashboard(&document)
    }
}
