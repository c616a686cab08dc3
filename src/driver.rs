//! Reading loop for Helios
//!
//! The driver owns the one [`ChargeController`] of the process. Readings
//! arrive through a bounded broadcast channel and are processed strictly one
//! at a time; each processed reading replaces the controller and publishes a
//! fresh [`ControllerSnapshot`] for observers.

use crate::balance::PowerBalance;
use crate::controller::ChargeController;
use crate::controls::ChargeSettings;
use crate::device::ChargingDevice;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub timestamp: DateTime<Utc>,
    pub current_amps: f64,
    pub charging: bool,
    pub trigger_time: Option<DateTime<Utc>>,
    pub average_external_watts: f64,
    /// Readings dropped so far because processing fell behind
    pub dropped_readings: u64,
}

impl ControllerSnapshot {
    fn of(controller: &ChargeController, dropped_readings: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            current_amps: controller.current().in_amps(),
            charging: controller.is_charging(),
            trigger_time: controller.trigger_time(),
            average_external_watts: controller.window().average_external_power().in_watts(),
            dropped_readings,
        }
    }
}

/// Bounded reading queue; a lagging consumer loses the oldest readings
pub fn reading_channel(
    capacity: usize,
) -> (
    broadcast::Sender<PowerBalance>,
    broadcast::Receiver<PowerBalance>,
) {
    broadcast::channel(capacity.max(1))
}

/// Single consumer of power readings
pub struct ChargeDriver<D: ChargingDevice + ?Sized> {
    device: Arc<D>,
    controller: ChargeController,
    snapshot_tx: watch::Sender<Arc<ControllerSnapshot>>,
    dropped_readings: u64,
    logger: StructuredLogger,
}

impl<D: ChargingDevice + ?Sized> ChargeDriver<D> {
    /// Check the device is reachable and seed the controller with the
    /// current it is charging with
    pub async fn start(device: Arc<D>, settings: Arc<ChargeSettings>) -> Result<Self> {
        let logger = get_logger("driver");

        device.heartbeat().await?;
        let current = device.current_charge_power().await?;
        let controller = ChargeController::for_current(current, settings)?;

        logger.info(&format!(
            "Initial charge current {}A, settings: {:?}",
            current.in_rounded_amps(),
            controller.settings()
        ));

        let (snapshot_tx, _) = watch::channel(Arc::new(ControllerSnapshot::of(&controller, 0)));

        Ok(Self {
            device,
            controller,
            snapshot_tx,
            dropped_readings: 0,
            logger,
        })
    }

    pub fn controller(&self) -> &ChargeController {
        &self.controller
    }

    /// Observe controller snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<ControllerSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Run one reading through the controller
    pub async fn handle_reading(&mut self, balance: PowerBalance) {
        self.logger.debug(&format!("Processing reading {}", balance));

        let next = self
            .controller
            .transition_for(balance, self.device.as_ref())
            .await;

        if next.current() != self.controller.current() {
            self.logger.info(&format!(
                "Charge current {}A -> {}A",
                self.controller.current().in_rounded_amps(),
                next.current().in_rounded_amps()
            ));
        }

        self.controller = next;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = ControllerSnapshot::of(&self.controller, self.dropped_readings);
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    /// Consume readings until `shutdown` turns `true` or all senders are gone
    pub async fn run(
        mut self,
        mut readings: broadcast::Receiver<PowerBalance>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ChargeController {
        self.logger.info("Starting charge driver loop");

        if *shutdown.borrow_and_update() {
            return self.controller;
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.logger.info("Shutdown signal received");
                        break;
                    }
                }
                received = readings.recv() => match received {
                    Ok(balance) => self.handle_reading(balance).await,
                    Err(RecvError::Lagged(skipped)) => {
                        self.dropped_readings += skipped;
                        self.logger.warn(&format!(
                            "Dropped {} stale readings ({} total)",
                            skipped, self.dropped_readings
                        ));
                        self.publish();
                    }
                    Err(RecvError::Closed) => {
                        self.logger.info("Reading channel closed");
                        break;
                    }
                }
            }
        }

        self.logger
            .info(&format!("Charge driver stopped at {}", self.controller));
        self.controller
    }
}
