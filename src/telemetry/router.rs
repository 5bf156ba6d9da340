use tokio::sync::{broadcast, watch};

use super::types::Message;
use super::types::response::{CommandResponse, DeviceEvent, Telemetry};

/// Where [`Router::route`] sent a message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Telemetry,
    Events,
    CommandResponses,
    /// The message updated the connection's client id and was not forwarded
    ClientId,
    /// The message was logged and discarded
    Dropped,
}

/// Fans decoded messages out to per-kind multicast channels.
///
/// Routing looks only at the message kind, never at the payload.
#[derive(Debug)]
pub struct Router {
    telemetry: broadcast::Sender<Telemetry>,
    events: broadcast::Sender<DeviceEvent>,
    command_responses: broadcast::Sender<CommandResponse>,
    client_id: watch::Sender<Option<String>>,
}

impl Router {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (events, _) = broadcast::channel(capacity);
        let (command_responses, _) = broadcast::channel(capacity);
        let (client_id, _) = watch::channel(None);

        Self {
            telemetry,
            events,
            command_responses,
            client_id,
        }
    }

    pub fn route(&self, message: Message) -> Route {
        match message {
            Message::Telemetry(telemetry) => {
                _ = self.telemetry.send(telemetry);
                Route::Telemetry
            }
            Message::Event(event) => {
                _ = self.events.send(event);
                Route::Events
            }
            Message::CommandResponse(response) => {
                _ = self.command_responses.send(response);
                Route::CommandResponses
            }
            Message::ConnectionAck(ack) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(client_id = %ack.client_id, "Connection acknowledged");
                self.client_id.send_replace(Some(ack.client_id));
                Route::ClientId
            }
            other => {
                #[cfg(feature = "tracing")]
                tracing::debug!(kind = other.kind(), "Dropping message of unroutable kind");
                #[cfg(not(feature = "tracing"))]
                let _ = &other;
                Route::Dropped
            }
        }
    }

    /// Forget the client id of a connection that is gone.
    pub fn clear_client_id(&self) {
        self.client_id.send_if_modified(|current| current.take().is_some());
    }

    #[must_use]
    pub fn telemetry(&self) -> broadcast::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn command_responses(&self) -> broadcast::Receiver<CommandResponse> {
        self.command_responses.subscribe()
    }

    #[must_use]
    pub fn client_id(&self) -> watch::Receiver<Option<String>> {
        self.client_id.subscribe()
    }
}
