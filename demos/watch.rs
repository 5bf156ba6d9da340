//! Watches a handful of devices and prints everything the server sends about them.
//!
//! The endpoint is read from `TELEMETRY_WS_URL` and defaults to `ws://localhost:8000/ws`.
//! Device ids are taken from the command line.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,device_telemetry_client=debug cargo run --example watch -- water-heater-01
//! ```

use std::time::Duration;

use device_telemetry_client::telemetry::Client;
use device_telemetry_client::ws::config::Config;
use futures::StreamExt as _;
use serde_json::{Map, json};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WATCH_FOR: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut devices: Vec<String> = std::env::args().skip(1).collect();
    if devices.is_empty() {
        devices.push("water-heater-01".to_owned());
    }

    let config = Config::from_env();
    info!(endpoint = %config.endpoint, ?devices, "Starting telemetry watch");

    let client = Client::new(config)?;
    for device in &devices {
        client.subscribe_to_device(device)?;
    }

    let mut status = Box::pin(client.connection_status());
    let mut telemetry = Box::pin(client.telemetry());
    let mut events = Box::pin(client.events());
    let mut responses = Box::pin(client.command_responses());

    client.connect()?;

    let deadline = sleep(WATCH_FOR);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,

            Some(connected) = status.next() => {
                info!(connected, client_id = ?client.client_id(), "Connection status changed");
                if connected {
                    let mut params = Map::new();
                    params.insert("mode".to_owned(), json!("eco"));
                    client.send_command(&devices[0], "set_mode", params)?;
                }
            }

            Some(sample) = telemetry.next() => match sample {
                Ok(sample) => info!(
                    device_id = %sample.device_id,
                    temperature = ?sample.data.temperature_current,
                    setpoint = ?sample.data.temperature_setpoint,
                    heating = ?sample.data.heating_status,
                    simulated = sample.simulated,
                    "Telemetry"
                ),
                Err(e) => warn!(error = %e, "Telemetry stream"),
            },

            Some(event) = events.next() => match event {
                Ok(event) => info!(
                    device_id = %event.device_id,
                    event_type = %event.event_type,
                    severity = %event.severity,
                    message = %event.message,
                    "Event"
                ),
                Err(e) => warn!(error = %e, "Event stream"),
            },

            Some(response) = responses.next() => match response {
                Ok(response) => info!(
                    device_id = %response.device_id,
                    command = %response.command,
                    status = %response.status,
                    message = %response.message,
                    "Command response"
                ),
                Err(e) => warn!(error = %e, "Command response stream"),
            },
        }
    }

    client.disconnect()?;
    info!(subscriptions = client.subscription_count(), "Done");

    Ok(())
}
