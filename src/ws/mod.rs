//! Core transport infrastructure.
//!
//! The session layer never touches sockets directly. It asks a [`Connector`] for a
//! [`Transport`] (a text-frame sink and stream) and drives that transport from a dedicated
//! task, one per connection attempt.
//!
//! # Architecture
//!
//! - [`Connector`]: Opens transports; [`WebSocketConnector`] is the default implementation
//! - [`config::Config`]: Endpoint and reconnection policy
//!
//! # Example
//!
//! ```ignore
//! let transport = WebSocketConnector.connect(&Url::parse("ws://localhost:8000/ws")?).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;

pub use connection::WebSocketConnector;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
