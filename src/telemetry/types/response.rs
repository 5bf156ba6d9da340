use std::collections::BTreeMap;
use std::fmt;

use bon::Builder;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// ISO-8601 timestamp exactly as the server sent it.
///
/// Servers emit values with and without a UTC offset, so the text is kept untouched and
/// re-encodes byte for byte. [`Timestamp::to_utc`] parses it on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a UTC instant. Values without an offset are read as UTC.
    ///
    /// Returns `None` if the text is not an ISO-8601 date or date-time.
    #[must_use]
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(parsed.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(&self.0, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(&self.0, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Timestamp {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// Telemetry sample reported by a device.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
pub struct Telemetry {
    /// Device that produced the sample
    #[builder(into)]
    pub device_id: String,
    /// When the sample was taken
    #[builder(into)]
    pub timestamp: Timestamp,
    /// Reported metrics
    #[builder(default)]
    pub data: TelemetryData,
    /// Whether the sample came from a simulator rather than real hardware
    pub simulated: bool,
}

impl Telemetry {
    /// Look up a metric by its wire name, whether it is a known field or an extra one.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.data.metric(name)
    }
}

/// Metrics carried by a telemetry sample.
///
/// Well-known metrics have typed fields. Anything else the device reports is kept in
/// [`TelemetryData::extra`] so newer firmware does not lose data on older clients. A
/// well-known metric sent with an unexpected type also lands in `extra` under its own name.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Builder)]
pub struct TelemetryData {
    /// Current water temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_current: Option<f64>,
    /// Target water temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_setpoint: Option<f64>,
    /// Whether the heating element is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heating_status: Option<bool>,
    /// Instantaneous power draw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_consumption: Option<f64>,
    /// Water flow through the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
    /// Operating mode reported by the device (e.g. `eco`, `boost`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Metrics without a dedicated field, or whose value did not fit it
    #[serde(flatten)]
    #[builder(default)]
    pub extra: BTreeMap<String, Option<MetricValue>>,
}

impl TelemetryData {
    /// Look up a metric by its wire name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        let known = match name {
            "temperature_current" => self.temperature_current.map(MetricValue::Number),
            "temperature_setpoint" => self.temperature_setpoint.map(MetricValue::Number),
            "heating_status" => self.heating_status.map(MetricValue::Bool),
            "power_consumption" => self.power_consumption.map(MetricValue::Number),
            "flow_rate" => self.flow_rate.map(MetricValue::Number),
            "mode" => self.mode.clone().map(MetricValue::Text),
            _ => None,
        };
        known.or_else(|| self.extra.get(name).cloned().flatten())
    }
}

impl<'de> Deserialize<'de> for TelemetryData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let metrics = Map::<String, Value>::deserialize(deserializer)?;
        let mut data = Self::default();

        for (name, value) in metrics {
            let unmatched = match name.as_str() {
                "temperature_current" => fill(&mut data.temperature_current, value),
                "temperature_setpoint" => fill(&mut data.temperature_setpoint, value),
                "heating_status" => fill(&mut data.heating_status, value),
                "power_consumption" => fill(&mut data.power_consumption, value),
                "flow_rate" => fill(&mut data.flow_rate, value),
                "mode" => fill(&mut data.mode, value),
                _ => Some(value),
            };
            if let Some(value) = unmatched {
                data.extra.insert(name, MetricValue::from_json(value));
            }
        }

        Ok(data)
    }
}

/// Store `value` in `slot` if it has the field's type, otherwise hand it back.
fn fill<T: DeserializeOwned>(slot: &mut Option<T>, value: Value) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    match T::deserialize(&value) {
        Ok(typed) => {
            *slot = Some(typed);
            None
        }
        Err(_) => Some(value),
    }
}

/// Metric value. Objects and arrays are kept as raw JSON.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Other(Value),
}

impl MetricValue {
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Some(Self::Number(f)),
                None => Some(Self::Other(Value::Number(n))),
            },
            Value::String(s) => Some(Self::Text(s)),
            other => Some(Self::Other(other)),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw JSON for structured values.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Other(value) => Some(value),
            _ => None,
        }
    }
}

/// Lifecycle or alarm event raised by a device.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
pub struct DeviceEvent {
    #[builder(into)]
    pub device_id: String,
    /// Event category (e.g. `maintenance_required`, `temperature_alert`)
    #[builder(into)]
    pub event_type: String,
    pub severity: Severity,
    /// Human-readable description
    #[builder(into)]
    pub message: String,
    /// Optional structured context attached by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[builder(into)]
    pub timestamp: Timestamp,
    pub simulated: bool,
}

impl DeviceEvent {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Event severity.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Acknowledgment for a previously issued command.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
pub struct CommandResponse {
    #[builder(into)]
    pub device_id: String,
    /// Identifier the server assigned to the command
    #[builder(into)]
    pub command_id: String,
    /// Name of the command being acknowledged
    #[builder(into)]
    pub command: String,
    pub status: CommandStatus,
    /// Human-readable outcome
    #[builder(into)]
    pub message: String,
    #[builder(into)]
    pub timestamp: Timestamp,
    pub simulated: bool,
}

impl CommandResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Outcome of a command.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

/// Sent by the server once a connection is accepted.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct ConnectionAck {
    /// Opaque identifier the server assigned to this connection
    #[builder(into)]
    pub client_id: String,
}
