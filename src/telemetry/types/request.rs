use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound request the client originates.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Start receiving updates for a device
    Subscribe(SubscriptionRequest),
    /// Stop receiving updates for a device
    Unsubscribe(SubscriptionRequest),
    /// Ask a device to perform an action
    Command(CommandRequest),
}

impl Request {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe<S: Into<String>>(device_id: S) -> Self {
        Self::Subscribe(SubscriptionRequest {
            device_id: device_id.into(),
        })
    }

    /// Create an unsubscribe request.
    #[must_use]
    pub fn unsubscribe<S: Into<String>>(device_id: S) -> Self {
        Self::Unsubscribe(SubscriptionRequest {
            device_id: device_id.into(),
        })
    }

    /// Create a command request.
    #[must_use]
    pub fn command<D: Into<String>, C: Into<String>>(
        device_id: D,
        command: C,
        params: Map<String, Value>,
    ) -> Self {
        Self::Command(CommandRequest {
            device_id: device_id.into(),
            command: command.into(),
            params,
        })
    }

    /// Device the request targets.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Subscribe(r) | Self::Unsubscribe(r) => &r.device_id,
            Self::Command(r) => &r.device_id,
        }
    }
}

/// Subscribe or unsubscribe payload.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Builder)]
pub struct SubscriptionRequest {
    #[builder(into)]
    pub device_id: String,
}

/// Command payload.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct CommandRequest {
    #[builder(into)]
    pub device_id: String,
    /// Command name (e.g. `set_temperature`, `set_mode`)
    #[builder(into)]
    pub command: String,
    /// Command arguments
    #[serde(default)]
    #[builder(default)]
    pub params: Map<String, Value>,
}
