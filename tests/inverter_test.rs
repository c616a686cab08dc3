use helios::balance::PowerBalance;
use helios::error::{HeliosError, Result};
use helios::inverter::{PowerSource, poll_power};
use helios::power::Power;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Replays readings, failing once it runs out
struct ScriptedSource {
    readings: Mutex<Vec<Result<PowerBalance>>>,
}

impl ScriptedSource {
    fn new(mut readings: Vec<Result<PowerBalance>>) -> Self {
        readings.reverse();
        Self {
            readings: Mutex::new(readings),
        }
    }
}

#[async_trait::async_trait]
impl PowerSource for ScriptedSource {
    async fn read_balance(&self) -> Result<PowerBalance> {
        self.readings
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(HeliosError::inverter("exhausted")))
    }
}

fn solar(watts: f64) -> PowerBalance {
    PowerBalance::solar_only(Power::of_watts(watts))
}

#[tokio::test]
async fn poller_skips_failed_reads_and_stops_on_shutdown() {
    let source = ScriptedSource::new(vec![
        Ok(solar(100.0)),
        Err(HeliosError::inverter("timeout")),
        Ok(solar(300.0)),
    ]);
    let (tx, mut rx) = broadcast::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = tokio::spawn(async move {
        poll_power(&source, Duration::from_millis(5), tx, shutdown_rx).await;
    });

    assert_eq!(rx.recv().await.unwrap(), solar(100.0));
    assert_eq!(rx.recv().await.unwrap(), solar(300.0));

    shutdown_tx.send(true).unwrap();
    poller.await.unwrap();
}

#[tokio::test]
async fn poller_stops_without_consumers() {
    let source = ScriptedSource::new(vec![Ok(solar(100.0))]);
    let (tx, rx) = broadcast::channel(8);
    drop(rx);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::time::timeout(
        Duration::from_secs(5),
        poll_power(&source, Duration::from_millis(5), tx, shutdown_rx),
    )
    .await
    .unwrap();
}

#[cfg(feature = "sma")]
mod sma {
    use helios::config::InverterConfig;
    use helios::inverter::{PowerSource, SmaClient};
    use helios::power::Power;
    use mockito::Server;
    use serde_json::json;

    fn config() -> InverterConfig {
        InverterConfig {
            host: "sma.local".to_string(),
            ..InverterConfig::default()
        }
    }

    #[tokio::test]
    async fn reads_dashboard_values() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/dyn/getDashValues.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "result": {
                        "017A-B339126F": {
                            "6100_40263F00": { "1": [ { "val": 2500 } ] },
                            "6100_40463700": { "1": [ { "val": 0 } ] },
                            "6100_40463600": { "1": [ { "val": 1800 } ] }
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = SmaClient::with_endpoint(
            format!("{}/dyn/getDashValues.json", server.url()),
            &config(),
        )
        .unwrap();
        let balance = client.read_balance().await.unwrap();

        assert_eq!(balance.solar_power(), Power::of_watts(2500.0));
        assert!(!balance.uses_external_power());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_failure_is_an_inverter_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/dyn/getDashValues.json")
            .with_status(503)
            .create_async()
            .await;

        let client = SmaClient::with_endpoint(
            format!("{}/dyn/getDashValues.json", server.url()),
            &config(),
        )
        .unwrap();

        assert!(matches!(
            client.read_balance().await,
            Err(helios::HeliosError::Inverter { .. })
        ));
    }

    #[test]
    fn builds_dashboard_url_from_host() {
        let client = SmaClient::new(&config()).unwrap();
        assert_eq!(client.endpoint(), "https://sma.local/dyn/getDashValues.json");
    }

    #[test]
    fn rejects_empty_host() {
        let cfg = InverterConfig {
            host: " ".to_string(),
            ..InverterConfig::default()
        };
        assert!(SmaClient::new(&cfg).is_err());
    }
}
