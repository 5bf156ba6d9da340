use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt as _, future};
use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use super::registry::SubscriptionRegistry;
use super::router::Router;
use super::session::{Command, Session, SessionHandle, SessionState};
use super::types::request::Request;
use super::types::response::{CommandResponse, DeviceEvent, Telemetry};
use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::{Connector, WebSocketConnector, WsError};

/// Real-time device telemetry client.
///
/// One client owns one session. Every operation returns immediately; outcomes are observed
/// through the exposed streams. The session keeps reconnecting until [`Client::disconnect`]
/// is called and replays every device subscription each time a connection opens.
///
/// Must be created from within a Tokio runtime.
///
/// # Examples
///
/// ```rust, no_run
/// use device_telemetry_client::telemetry::Client;
/// use futures::StreamExt as _;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::default();
///     client.subscribe_to_device("wh-1")?;
///     client.connect()?;
///
///     let mut telemetry = Box::pin(client.telemetry());
///     while let Some(sample) = telemetry.next().await {
///         let sample = sample?;
///         println!("{}: {:?}", sample.device_id, sample.data.temperature_current);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Config::default())
            .expect("Telemetry client with default endpoint should succeed")
    }
}

struct ClientInner {
    /// Configuration the session was started with
    config: Config,
    /// Devices the caller wants updates for
    registry: Arc<SubscriptionRegistry>,
    /// Per-kind multicast channels fed by the session
    router: Arc<Router>,
    /// Command channel and state watchers of the session task
    session: SessionHandle,
    /// Client id assigned by the server for the current connection
    client_id: watch::Receiver<Option<String>>,
}

impl Client {
    /// Create a client that talks WebSocket to `config.endpoint`.
    ///
    /// The session starts idle; call [`Client::connect`] to open it.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Create a client using [`Config::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    /// Create a client that opens its transports through `connector`.
    pub fn with_connector<C: Connector>(config: Config, connector: C) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        if config.channel_capacity == 0 {
            return Err(Error::validation("channel capacity must be greater than zero"));
        }

        let registry = Arc::new(SubscriptionRegistry::new());
        let router = Arc::new(Router::new(config.channel_capacity));
        let client_id = router.client_id();
        let session = Session::spawn(
            Arc::new(connector),
            endpoint,
            config.reconnect.clone(),
            Arc::clone(&registry),
            Arc::clone(&router),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                registry,
                router,
                session,
                client_id,
            }),
        })
    }

    /// Start connecting. Does nothing if the session is already connecting or open.
    pub fn connect(&self) -> Result<()> {
        self.inner.session.send(Command::Connect)
    }

    /// Close the session for good: pending reconnects are cancelled and the transport is
    /// released. Subscriptions are kept for the next [`Client::connect`].
    ///
    /// The state moves to [`SessionState::Closed`] as soon as the session handles the command
    /// and no frame is delivered after that. The transport close handshake runs in the
    /// background and is abandoned after one second, so the server may observe the
    /// disconnect slightly later than this call returns.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.session.send(Command::Disconnect)
    }

    /// Start receiving updates for a device.
    ///
    /// The device is remembered across reconnects. If the session is open the subscribe
    /// request goes out right away; otherwise it is sent when the next connection opens.
    pub fn subscribe_to_device(&self, device_id: &str) -> Result<()> {
        let device_id = validate_device_id(device_id)?;
        if self.inner.registry.add(device_id) {
            self.inner
                .session
                .send(Command::Subscribe(device_id.to_owned()))?;
        }
        Ok(())
    }

    /// Stop receiving updates for a device. Unknown devices are ignored.
    pub fn unsubscribe_from_device(&self, device_id: &str) -> Result<()> {
        let device_id = validate_device_id(device_id)?;
        if self.inner.registry.remove(device_id) {
            self.inner
                .session
                .send(Command::Unsubscribe(device_id.to_owned()))?;
        }
        Ok(())
    }

    /// Send a command to a device.
    ///
    /// Commands are sent at most once and only while the session is open. A command issued
    /// while disconnected is silently dropped, not queued.
    pub fn send_command(
        &self,
        device_id: &str,
        command: &str,
        params: Map<String, Value>,
    ) -> Result<()> {
        let device_id = validate_device_id(device_id)?;
        if command.trim().is_empty() {
            return Err(Error::validation("command cannot be empty"));
        }

        let request = Request::command(device_id, command, params);
        self.inner.session.send(Command::Send(request))
    }

    /// Whether the session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.session.state.borrow().is_open()
    }

    /// Get the current session state.
    #[must_use]
    pub fn connection_state(&self) -> SessionState {
        *self.inner.session.state.borrow()
    }

    /// Subscribe to session state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.inner.session.state.clone()
    }

    /// Connection status: `true` while open.
    ///
    /// The current value is yielded first, then every change.
    pub fn connection_status(&self) -> impl Stream<Item = bool> + use<> {
        let mut status = self.inner.session.status.clone();

        stream! {
            let current = *status.borrow_and_update();
            yield current;

            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                yield current;
            }
        }
    }

    /// Telemetry from every subscribed device.
    ///
    /// Only samples received after this call are yielded.
    pub fn telemetry(&self) -> impl Stream<Item = Result<Telemetry>> + use<> {
        multicast(self.inner.router.telemetry())
    }

    /// Device events from every subscribed device.
    pub fn events(&self) -> impl Stream<Item = Result<DeviceEvent>> + use<> {
        multicast(self.inner.router.events())
    }

    /// Command acknowledgments.
    pub fn command_responses(&self) -> impl Stream<Item = Result<CommandResponse>> + use<> {
        multicast(self.inner.router.command_responses())
    }

    /// Telemetry for a single device.
    pub fn device_telemetry(
        &self,
        device_id: &str,
    ) -> impl Stream<Item = Result<Telemetry>> + use<> {
        let device_id = device_id.to_owned();
        self.telemetry().filter(move |item| {
            future::ready(match item {
                Ok(telemetry) => telemetry.device_id == device_id,
                Err(_) => true,
            })
        })
    }

    /// Events for a single device.
    pub fn device_events(
        &self,
        device_id: &str,
    ) -> impl Stream<Item = Result<DeviceEvent>> + use<> {
        let device_id = device_id.to_owned();
        self.events().filter(move |item| {
            future::ready(match item {
                Ok(event) => event.device_id == device_id,
                Err(_) => true,
            })
        })
    }

    /// Client id the server assigned to the current connection, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id.borrow().clone()
    }

    /// Devices currently subscribed to.
    #[must_use]
    pub fn subscriptions(&self) -> HashSet<String> {
        self.inner.registry.snapshot()
    }

    /// Get the number of subscribed devices.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Configuration the client was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

/// Reject blank ids. Accepted ids are passed through exactly as given.
fn validate_device_id(device_id: &str) -> Result<&str> {
    if device_id.trim().is_empty() {
        return Err(Error::validation("device id cannot be empty"));
    }
    Ok(device_id)
}

/// Turn a broadcast receiver into a stream that reports lag instead of ending on it.
fn multicast<T: Clone + Send + 'static>(
    mut rx: broadcast::Receiver<T>,
) -> impl Stream<Item = Result<T>> {
    stream! {
        loop {
            match rx.recv().await {
                Ok(item) => yield Ok(item),
                Err(RecvError::Lagged(count)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Telemetry stream lagged, missed {count} messages");
                    yield Err(Error::from(WsError::Lagged { count }));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
