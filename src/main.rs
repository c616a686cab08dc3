use anyhow::Result;
use helios::config::Config;
use helios::driver::{ChargeDriver, reading_channel};
use helios::inverter::{SmaClient, poll_power};
use helios::vehicle::TeslaVehicle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;

    helios::logging::init_logging(&config.logging)?;
    info!(
        "Helios {} starting up, inverter at {}",
        env!("APP_VERSION"),
        config.inverter.host
    );

    let settings = Arc::new(config.charge_settings()?);
    let vehicle = Arc::new(TeslaVehicle::new(&config.vehicle)?);
    let inverter = SmaClient::new(&config.inverter)?;

    let driver = ChargeDriver::start(vehicle, settings)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start driver: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (readings_tx, readings_rx) = reading_channel(config.driver.reading_queue_capacity);

    let period = Duration::from_secs(config.inverter.polling_interval_secs);
    let poller_shutdown = shutdown_rx.clone();
    let poller = tokio::spawn(async move {
        poll_power(&inverter, period, readings_tx, poller_shutdown).await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Ctrl-C received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let controller = driver.run(readings_rx, shutdown_rx).await;
    poller.abort();

    info!("Driver shutdown complete at {}", controller);
    Ok(())
}
