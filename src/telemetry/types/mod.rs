pub mod request;
pub mod response;

use self::request::{CommandRequest, Request, SubscriptionRequest};
use self::response::{CommandResponse, ConnectionAck, DeviceEvent, Telemetry};

/// Every message kind that can appear on the wire, keyed by the `type` field.
///
/// Frames whose `type` is well-formed but not one of the kinds below decode to
/// [`Message::Unknown`] carrying the raw tag.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(Telemetry),
    Event(DeviceEvent),
    CommandResponse(CommandResponse),
    ConnectionAck(ConnectionAck),
    Subscribe(SubscriptionRequest),
    Unsubscribe(SubscriptionRequest),
    Command(CommandRequest),
    Unknown(String),
}

impl Message {
    /// The wire tag of this message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Telemetry(_) => "telemetry",
            Self::Event(_) => "event",
            Self::CommandResponse(_) => "command_response",
            Self::ConnectionAck(_) => "connection_ack",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Command(_) => "command",
            Self::Unknown(kind) => kind,
        }
    }

    /// The device this message concerns, if it is device scoped.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Telemetry(m) => Some(&m.device_id),
            Self::Event(m) => Some(&m.device_id),
            Self::CommandResponse(m) => Some(&m.device_id),
            Self::Subscribe(m) | Self::Unsubscribe(m) => Some(&m.device_id),
            Self::Command(m) => Some(&m.device_id),
            Self::ConnectionAck(_) | Self::Unknown(_) => None,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        match request {
            Request::Subscribe(r) => Self::Subscribe(r),
            Request::Unsubscribe(r) => Self::Unsubscribe(r),
            Request::Command(r) => Self::Command(r),
        }
    }
}
