#![allow(dead_code)]

use helios::device::ChargingDevice;
use helios::error::{HeliosError, Result};
use helios::power::Power;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A call observed by [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Heartbeat,
    ChargeRequired,
    ChargePower,
    Start(i64),
    Stop,
    Adjust(i64),
}

/// In-memory charging device that records every call
pub struct RecordingDevice {
    calls: Mutex<Vec<Call>>,
    charge_required: AtomicBool,
    fail_charge_required: AtomicBool,
    fail_commands: AtomicBool,
    charge_power: Mutex<Power>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            charge_required: AtomicBool::new(true),
            fail_charge_required: AtomicBool::new(false),
            fail_commands: AtomicBool::new(false),
            charge_power: Mutex::new(Power::NONE),
        }
    }

    pub fn charging_at(amps: i64) -> Self {
        let device = Self::new();
        *device.charge_power.lock().unwrap() = Power::of_amps(amps);
        device
    }

    pub fn set_charge_required(&self, required: bool) {
        self.charge_required.store(required, Ordering::SeqCst);
    }

    pub fn fail_charge_required(&self, fail: bool) {
        self.fail_charge_required.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the charge-required probe
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::ChargeRequired)
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn command_result(&self) -> Result<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(HeliosError::device("command rejected"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ChargingDevice for RecordingDevice {
    async fn heartbeat(&self) -> Result<()> {
        self.record(Call::Heartbeat);
        Ok(())
    }

    async fn charge_required(&self) -> Result<bool> {
        self.record(Call::ChargeRequired);
        if self.fail_charge_required.load(Ordering::SeqCst) {
            return Err(HeliosError::network("vehicle unreachable"));
        }
        Ok(self.charge_required.load(Ordering::SeqCst))
    }

    async fn current_charge_power(&self) -> Result<Power> {
        self.record(Call::ChargePower);
        Ok(*self.charge_power.lock().unwrap())
    }

    async fn start(&self, current: Power) -> Result<()> {
        self.record(Call::Start(current.in_rounded_amps()));
        self.command_result()
    }

    async fn stop(&self) -> Result<()> {
        self.record(Call::Stop);
        self.command_result()
    }

    async fn adjust(&self, current: Power) -> Result<()> {
        self.record(Call::Adjust(current.in_rounded_amps()));
        self.command_result()
    }
}
