#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of these helpers"
)]

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use device_telemetry_client::Result;
use device_telemetry_client::error::Error;
use device_telemetry_client::telemetry::{Client, SessionState};
use device_telemetry_client::ws::{Connector, Transport, WsError};
use futures::channel::mpsc as frames;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// How long to wait for something the test expects to happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long to wait before concluding that something did not happen.
pub const QUIET: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
enum Control {
    Frame(String),
    Close,
}

/// Mock WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast frames and close requests to ALL connected clients
    control_tx: broadcast::Sender<Control>,
    /// Receives requests from clients
    request_rx: mpsc::UnboundedReceiver<String>,
    /// Notified once per accepted connection
    accepted_rx: mpsc::UnboundedReceiver<()>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (control_tx, _) = broadcast::channel::<Control>(100);
        let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel::<()>();

        let broadcast_tx = control_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                // Subscribe before the handshake so nothing sent after the client opens is lost
                let mut control_rx = broadcast_tx.subscribe();
                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let request_tx = request_tx.clone();
                drop(accepted_tx.send(()));

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(request_tx.send(text.to_string()));
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            control = control_rx.recv() => {
                                match control {
                                    Ok(Control::Frame(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(Control::Close) | Err(_) => {
                                        drop(write.send(Message::Close(None)).await);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            control_tx,
            request_rx,
            accepted_rx,
        }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.control_tx.send(Control::Frame(message.to_owned())));
    }

    /// Close every open connection from the server side.
    pub fn close_all(&self) {
        drop(self.control_tx.send(Control::Close));
    }

    /// Wait for the next accepted connection.
    pub async fn accepted(&mut self) -> bool {
        timeout(WAIT, self.accepted_rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }

    /// Receive the next request, parsed as JSON.
    pub async fn recv_request(&mut self) -> Option<Value> {
        self.recv_request_within(WAIT).await
    }

    /// Receive the next request if one arrives within `wait`.
    pub async fn recv_request_within(&mut self, wait: Duration) -> Option<Value> {
        let text = timeout(wait, self.request_rx.recv()).await.ok().flatten()?;
        Some(serde_json::from_str(&text).unwrap())
    }
}

/// Connection attempt handed to the test by [`ChannelConnector`].
pub struct Attempt {
    respond: oneshot::Sender<Result<Transport>>,
}

impl Attempt {
    /// Let the attempt succeed and return the server side of the transport.
    pub fn accept(self) -> Peer {
        let (client_tx, server_rx) = frames::unbounded::<String>();
        let (server_tx, client_rx) = frames::unbounded::<Result<String>>();

        let sink = client_tx.sink_map_err(|e| Error::from(WsError::SendFailed(e.to_string())));
        drop(self.respond.send(Ok(Transport::new(sink, client_rx))));

        Peer {
            incoming: server_rx,
            outgoing: server_tx,
        }
    }

    /// Let the attempt fail.
    pub fn reject(self) {
        drop(self.respond.send(Err(WsError::ConnectionClosed.into())));
    }
}

/// Server side of a transport opened through [`ChannelConnector`].
pub struct Peer {
    incoming: frames::UnboundedReceiver<String>,
    outgoing: frames::UnboundedSender<Result<String>>,
}

impl Peer {
    /// Next frame the client sent, parsed as JSON.
    pub async fn recv(&mut self) -> Value {
        let text = self.incoming.next().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }

    /// Whether the client has sent nothing that has not been received yet.
    pub fn is_quiet(&mut self) -> bool {
        !matches!(self.incoming.try_next(), Ok(Some(_)))
    }

    pub fn send(&self, frame: &str) {
        drop(self.outgoing.unbounded_send(Ok(frame.to_owned())));
    }

    /// Wait until the client closes its side, skipping any frames still in flight.
    pub async fn closed(&mut self) {
        while self.incoming.next().await.is_some() {}
    }
}

/// [`Connector`] that hands every attempt to the test instead of opening a socket.
pub struct ChannelConnector {
    attempts: mpsc::UnboundedSender<Attempt>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Attempt>) {
        let (attempts, attempts_rx) = mpsc::unbounded_channel();
        (Self { attempts }, attempts_rx)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, _endpoint: &Url) -> Result<Transport> {
        let (respond, response) = oneshot::channel();
        self.attempts
            .send(Attempt { respond })
            .map_err(|_e| WsError::ConnectionClosed)?;

        match response.await {
            Ok(result) => result,
            Err(_) => Err(WsError::ConnectionClosed.into()),
        }
    }
}

/// Wait until the client reaches `state`.
pub async fn wait_for_state(client: &Client, state: SessionState) {
    let mut receiver = client.state_receiver();
    receiver.wait_for(|current| *current == state).await.unwrap();
}

/// Example payloads as the telemetry server sends them.
pub mod payloads {
    use serde_json::{Value, json};

    pub const DEVICE_ID: &str = "water-heater-01";
    pub const OTHER_DEVICE_ID: &str = "water-heater-02";

    #[must_use]
    pub fn telemetry(device_id: &str) -> Value {
        json!({
            "type": "telemetry",
            "device_id": device_id,
            "timestamp": "2025-01-15T10:30:00Z",
            "data": {
                "temperature_current": 58.5,
                "temperature_setpoint": 60.0,
                "heating_status": true,
                "power_consumption": 2.4,
                "flow_rate": 0.0,
                "mode": "eco",
                "tank_pressure": 3.1
            },
            "simulated": true
        })
    }

    #[must_use]
    pub fn event(device_id: &str) -> Value {
        json!({
            "type": "event",
            "device_id": device_id,
            "event_type": "overheat",
            "severity": "error",
            "message": "Temperature exceeded safety threshold",
            "details": { "threshold": 85.0, "measured": 87.2 },
            "timestamp": "2025-01-15T10:31:00Z",
            "simulated": false
        })
    }

    #[must_use]
    pub fn command_response(device_id: &str) -> Value {
        json!({
            "type": "command_response",
            "device_id": device_id,
            "command_id": "cmd-42",
            "command": "set_temperature",
            "status": "success",
            "message": "Setpoint updated",
            "timestamp": "2025-01-15T10:32:00+02:00",
            "simulated": false
        })
    }

    #[must_use]
    pub fn connection_ack(client_id: &str) -> Value {
        json!({
            "type": "connection_ack",
            "client_id": client_id
        })
    }
}
