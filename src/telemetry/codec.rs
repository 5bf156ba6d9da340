//! Conversion between wire frames and typed messages.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::error::DecodeError;
use super::types::Message;
use super::types::request::Request;

/// Decode one inbound frame.
///
/// The `type` field is read first. Known kinds are then deserialized into their typed
/// payload; a well-formed frame with an unrecognised `type` yields [`Message::Unknown`].
pub fn decode(raw: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Syntax)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingKind)?
        .to_owned();

    let message = match kind.as_str() {
        "telemetry" => Message::Telemetry(fields(kind, value)?),
        "event" => Message::Event(fields(kind, value)?),
        "command_response" => Message::CommandResponse(fields(kind, value)?),
        "connection_ack" => Message::ConnectionAck(fields(kind, value)?),
        "subscribe" => Message::Subscribe(fields(kind, value)?),
        "unsubscribe" => Message::Unsubscribe(fields(kind, value)?),
        "command" => Message::Command(fields(kind, value)?),
        _ => Message::Unknown(kind),
    };

    Ok(message)
}

fn fields<T: DeserializeOwned>(kind: String, value: Value) -> Result<T, DecodeError> {
    serde_path_to_error::deserialize(value).map_err(|e| DecodeError::InvalidFields {
        kind,
        path: e.path().to_string(),
        source: e.into_inner(),
    })
}

/// Encode an outbound request as a text frame.
#[must_use]
pub fn encode(request: &Request) -> String {
    let mut object = Map::new();
    match request {
        Request::Subscribe(r) => {
            object.insert("type".to_owned(), Value::from("subscribe"));
            object.insert("device_id".to_owned(), Value::from(r.device_id.as_str()));
        }
        Request::Unsubscribe(r) => {
            object.insert("type".to_owned(), Value::from("unsubscribe"));
            object.insert("device_id".to_owned(), Value::from(r.device_id.as_str()));
        }
        Request::Command(r) => {
            object.insert("type".to_owned(), Value::from("command"));
            object.insert("device_id".to_owned(), Value::from(r.device_id.as_str()));
            object.insert("command".to_owned(), Value::from(r.command.as_str()));
            object.insert("params".to_owned(), Value::Object(r.params.clone()));
        }
    }

    Value::Object(object).to_string()
}
