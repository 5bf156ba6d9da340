#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;
use url::Url;

use crate::error::Error;
use crate::{DEFAULT_ENDPOINT, ENDPOINT_VAR, Result};

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for the telemetry session.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// WebSocket endpoint the session connects to
    #[builder(into, default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Capacity of each multicast stream before slow subscribers start lagging
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            reconnect: ReconnectConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Build a configuration whose endpoint comes from [`ENDPOINT_VAR`], falling back to
    /// [`DEFAULT_ENDPOINT`] when the variable is unset or blank.
    #[must_use]
    pub fn from_env() -> Self {
        let endpoint = std::env::var(ENDPOINT_VAR)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());

        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Parse the endpoint, accepting only `ws://` and `wss://` URLs.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::validation(format!(
                "unsupported endpoint scheme `{scheme}`, expected ws or wss"
            ))),
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Reconnection is retried forever at a constant interval. There is no growth and no jitter.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Delay between a transport failure and the next connection attempt
    #[builder(default = DEFAULT_RECONNECT_DELAY_DURATION)]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY_DURATION,
        }
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.delay)
    }
}
