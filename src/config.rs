//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The configuration is read once at startup
//! and treated as immutable afterwards.

use crate::controls::ChargeSettings;
use crate::error::{HeliosError, Result};
use crate::power::Power;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Charging policy
    pub charging: ChargingConfig,

    /// Inverter polling
    pub inverter: InverterConfig,

    /// Vehicle API access
    pub vehicle: VehicleConfig,

    /// Reading pipeline tuning
    pub driver: DriverConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Charging policy limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// Minimum current the vehicle accepts, in amperes
    pub min_current_amps: u32,

    /// Maximum current we ever request, in amperes
    pub max_current_amps: u32,

    /// Number of readings to smooth over before acting. Larger values give
    /// smoother charging but react later to changes in supply.
    pub adjustment_window: usize,

    /// Grid power we accept to keep charging when solar is just short of the
    /// minimum. E.g. 800 W spare with 1200 W needed charges at minimum when
    /// this is at least 400 W.
    pub accepted_external_consumption_watts: u32,

    /// Grace period before an intended stop is carried out, in seconds
    pub exceed_charge_window_secs: u64,
}

/// SMA inverter endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// Host name or IP address of the inverter
    pub host: String,

    /// Seconds between readings
    pub polling_interval_secs: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Inverters ship self-signed certificates
    pub accept_invalid_certs: bool,
}

/// Tesla owner API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// API base URL
    pub api_base: String,

    /// Bearer token; obtaining and refreshing it happens elsewhere
    #[serde(skip_serializing)]
    pub access_token: String,

    /// Vehicle id as used in API paths
    pub vehicle_id: String,

    /// How long a charge-state document stays valid, in seconds
    pub charge_state_ttl_secs: u64,

    /// State polls after a wake-up request timed out
    pub wake_up_attempts: u32,

    /// Seconds between those polls
    pub wake_up_delay_secs: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Reading pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Readings buffered while a device command is in flight; the oldest are
    /// dropped beyond this
    pub reading_queue_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for console output level
    pub console_level: Option<String>,

    /// Optional override for file output level
    pub file_level: Option<String>,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            min_current_amps: 5,
            max_current_amps: 13,
            adjustment_window: 5,
            accepted_external_consumption_watts: 0,
            exceed_charge_window_secs: 600,
        }
    }
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.50".to_string(),
            polling_interval_secs: 30,
            request_timeout_secs: 10,
            accept_invalid_certs: true,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://owner-api.teslamotors.com/api/1".to_string(),
            access_token: String::new(),
            vehicle_id: String::new(),
            charge_state_ttl_secs: 60,
            wake_up_attempts: 5,
            wake_up_delay_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            reading_queue_capacity: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl ChargingConfig {
    /// Convert into validated [`ChargeSettings`]
    pub fn to_settings(&self) -> Result<ChargeSettings> {
        let exceed_charge_window = i64::try_from(self.exceed_charge_window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                HeliosError::validation("charging.exceed_charge_window_secs", "Value too large")
            })?;

        ChargeSettings::new(
            Power::of_amps(i64::from(self.min_current_amps)),
            Power::of_amps(i64::from(self.max_current_amps)),
            self.adjustment_window,
            Power::of_watts(f64::from(self.accepted_external_consumption_watts)),
            exceed_charge_window,
        )
        .map_err(|e| match e {
            HeliosError::Validation { field, message } => {
                HeliosError::validation(format!("charging.{}", field), message)
            }
            other => other,
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// The charging policy described by this configuration
    pub fn charge_settings(&self) -> Result<ChargeSettings> {
        self.charging.to_settings()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.charge_settings()?;

        if self.inverter.host.trim().is_empty() {
            return Err(HeliosError::validation(
                "inverter.host",
                "Host cannot be empty",
            ));
        }

        if self.inverter.polling_interval_secs == 0 {
            return Err(HeliosError::validation(
                "inverter.polling_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.driver.reading_queue_capacity == 0 {
            return Err(HeliosError::validation(
                "driver.reading_queue_capacity",
                "Must be greater than 0",
            ));
        }

        if self.vehicle.api_base.trim().is_empty() {
            return Err(HeliosError::validation(
                "vehicle.api_base",
                "API base URL cannot be empty",
            ));
        }

        Ok(())
    }
}
