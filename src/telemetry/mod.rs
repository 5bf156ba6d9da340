#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Real-time device telemetry over a persistent WebSocket session.
//!
//! A [`Client`] keeps one session to the telemetry server alive: it reconnects on a fixed
//! delay after any failure, replays device subscriptions whenever a connection opens and
//! fans decoded messages out to per-kind streams.
//!
//! # Streams
//!
//! - **Telemetry**: Periodic sensor readings per device
//! - **Events**: Discrete device events with a severity
//! - **Command responses**: Acknowledgments of commands sent with [`Client::send_command`]
//! - **Connection status**: `true` while the session is open
//!
//! # Example
//!
//! ```rust, no_run
//! use device_telemetry_client::telemetry::Client;
//! use device_telemetry_client::ws::config::Config;
//! use futures::StreamExt as _;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(Config::from_env())?;
//!     client.subscribe_to_device("water-heater-01")?;
//!     client.connect()?;
//!
//!     let mut events = Box::pin(client.events());
//!     while let Some(event) = events.next().await {
//!         let event = event?;
//!         println!("[{}] {}: {}", event.severity, event.device_id, event.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;
pub mod types;

pub use client::Client;
pub use codec::{decode, encode};
pub use error::DecodeError;
pub use registry::SubscriptionRegistry;
pub use router::{Route, Router};
pub use session::SessionState;
pub use types::Message;
pub use types::request::{CommandRequest, Request, SubscriptionRequest};
pub use types::response::{
    CommandResponse, CommandStatus, ConnectionAck, DeviceEvent, MetricValue, Severity, Telemetry,
    TelemetryData, Timestamp,
};
