//! Tesla owner API charging device
//!
//! Talks to the vehicle through the owner API with a pre-provisioned bearer
//! token. Vehicles that fell asleep are woken before reads and before
//! charging is started.

use crate::config::VehicleConfig;
use crate::device::ChargingDevice;
use crate::error::{HeliosError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::power::Power;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Vehicle state as reported by `GET /vehicles/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Online,
    Asleep,
    Undefined,
}

impl VehicleState {
    fn parse(value: &str) -> Self {
        match value {
            "online" => VehicleState::Online,
            "asleep" => VehicleState::Asleep,
            _ => VehicleState::Undefined,
        }
    }
}

/// Tesla vehicle driven through the owner API
pub struct TeslaVehicle {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
    vehicle_id: String,
    charge_state_ttl: Duration,
    wake_up_attempts: u32,
    wake_up_delay: Duration,
    charge_state: Mutex<Option<(Instant, Value)>>,
    logger: StructuredLogger,
}

impl TeslaVehicle {
    pub fn new(config: &VehicleConfig) -> Result<Self> {
        if config.vehicle_id.trim().is_empty() {
            return Err(HeliosError::validation(
                "vehicle.vehicle_id",
                "Vehicle id cannot be empty",
            ));
        }
        if config.access_token.trim().is_empty() {
            return Err(HeliosError::validation(
                "vehicle.access_token",
                "Access token cannot be empty",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let logger =
            get_logger_with_context(LogContext::new("vehicle").with_device(&config.vehicle_id));

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            vehicle_id: config.vehicle_id.clone(),
            charge_state_ttl: Duration::from_secs(config.charge_state_ttl_secs),
            wake_up_attempts: config.wake_up_attempts,
            wake_up_delay: Duration::from_secs(config.wake_up_delay_secs),
            charge_state: Mutex::new(None),
            logger,
        })
    }

    fn vehicles_url(&self) -> String {
        format!("{}/vehicles", self.api_base)
    }

    fn vehicle_url(&self, suffix: &str) -> String {
        format!("{}/vehicles/{}{}", self.api_base, self.vehicle_id, suffix)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = check_status(resp, url)?;
        Ok(resp.json().await?)
    }

    async fn post(&self, url: &str, body: Value) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(resp, url)?;
        Ok(())
    }

    /// Current state of the vehicle
    pub async fn vehicle_state(&self) -> Result<VehicleState> {
        let doc = self.get_json(&self.vehicle_url("")).await?;
        let state = doc
            .pointer("/response/state")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(VehicleState::parse(state))
    }

    /// Wake the vehicle, waiting for it to come online if the request times out
    pub async fn wake_up(&self) -> Result<()> {
        self.logger.info("Trigger wake up");

        match self.post(&self.vehicle_url("/wake_up"), json!({})).await {
            Ok(()) => {
                self.logger.info("Successfully woken up vehicle");
                return Ok(());
            }
            Err(HeliosError::Timeout { .. }) => {}
            Err(e) => return Err(e),
        }

        for _ in 0..self.wake_up_attempts {
            self.logger.info("Not alive yet, continue waiting");
            tokio::time::sleep(self.wake_up_delay).await;

            if self.vehicle_state().await? == VehicleState::Online {
                self.logger.info("Successfully woken up vehicle");
                return Ok(());
            }
        }

        // Proceed anyway, the next request reports whatever is wrong
        self.logger.warn("Failed to wake up vehicle");
        Ok(())
    }

    async fn ensure_awake(&self) -> Result<()> {
        if self.vehicle_state().await? == VehicleState::Asleep {
            self.wake_up().await?;
        }
        Ok(())
    }

    async fn fetch_charge_state(&self) -> Result<Value> {
        let doc = self
            .get_json(&self.vehicle_url("/data_request/charge_state"))
            .await?;
        *self.charge_state.lock().await = Some((Instant::now(), doc.clone()));
        Ok(doc)
    }

    async fn cached_charge_state(&self) -> Result<Value> {
        if let Some((fetched_at, doc)) = self.charge_state.lock().await.as_ref()
            && fetched_at.elapsed() < self.charge_state_ttl
        {
            return Ok(doc.clone());
        }

        self.ensure_awake().await?;
        self.fetch_charge_state().await
    }

    /// Drop the cached charge-state document
    async fn invalidate_charge_state(&self) {
        *self.charge_state.lock().await = None;
    }
}

fn check_status(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = format!("{} returned {}", url, status);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HeliosError::auth(message),
        StatusCode::REQUEST_TIMEOUT => HeliosError::timeout(message),
        _ => HeliosError::api(message),
    })
}

fn read_i64(doc: &Value, pointer: &str) -> Result<i64> {
    doc.pointer(pointer)
        .and_then(Value::as_i64)
        .ok_or_else(|| HeliosError::api(format!("Charge state lacks {}", pointer)))
}

#[async_trait::async_trait]
impl ChargingDevice for TeslaVehicle {
    async fn heartbeat(&self) -> Result<()> {
        self.get_json(&self.vehicles_url()).await?;
        self.logger
            .info(&format!("Successfully connected to {}", self.api_base));
        Ok(())
    }

    async fn charge_required(&self) -> Result<bool> {
        let doc = self.cached_charge_state().await?;
        let battery_level = read_i64(&doc, "/response/battery_level")?;
        let charge_limit = read_i64(&doc, "/response/charge_limit_soc")?;

        self.logger.debug(&format!(
            "Charge limit set to {}%, current charge at {}%",
            charge_limit, battery_level
        ));

        Ok(battery_level < charge_limit)
    }

    async fn current_charge_power(&self) -> Result<Power> {
        self.ensure_awake().await?;

        let doc = match self.fetch_charge_state().await {
            Ok(doc) => doc,
            Err(e @ (HeliosError::Api { .. } | HeliosError::Auth { .. })) => {
                self.logger.warn(&e.to_string());
                return Ok(Power::NONE);
            }
            Err(e) => return Err(e),
        };

        let stopped = doc.pointer("/response/charging_state").and_then(Value::as_str)
            == Some("Stopped");
        if stopped {
            return Ok(Power::NONE);
        }

        Ok(Power::of_amps(read_i64(
            &doc,
            "/response/charger_actual_current",
        )?))
    }

    async fn start(&self, current: Power) -> Result<()> {
        self.ensure_awake().await?;

        self.logger.info("Start charging");
        self.post(&self.vehicle_url("/command/charge_start"), json!({}))
            .await?;
        self.invalidate_charge_state().await;
        self.logger.info("Charging started");

        self.adjust(current).await
    }

    async fn stop(&self) -> Result<()> {
        self.logger.info("Stop charging");
        self.post(&self.vehicle_url("/command/charge_stop"), json!({}))
            .await?;
        self.invalidate_charge_state().await;
        self.logger.info("Stopped charging");
        Ok(())
    }

    async fn adjust(&self, current: Power) -> Result<()> {
        let amps = current.in_rounded_amps();
        self.logger
            .info(&format!("Adjusting charge to {}A", amps));
        self.post(
            &self.vehicle_url("/command/set_charging_amps"),
            json!({ "charging_amps": amps }),
        )
        .await?;
        self.logger.info("Charge adjusted");
        Ok(())
    }
}
