//! Home Assistant light sensor client.
//!
//! Reads one entity from the Home Assistant REST API (`/api/states/<entity>`) using a long-lived
//! access token.
use crate::config::HaConfig;

use reqwest::StatusCode;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::num::ParseFloatError;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Home Assistant returned status {0}")]
    Status(StatusCode),
    #[error("could not decode sensor state: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("sensor state `{value}` is not a number: {source}")]
    Parse {
        value: String,
        source: ParseFloatError,
    },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Attributes {
    pub unit_of_measurement: Option<String>,
    pub friendly_name: Option<String>,
}

/// State of a Home Assistant entity. Only `state` is used to pick a brightness.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SensorReading {
    pub entity_id: String,
    pub state: String,
    pub last_changed: String,
    pub last_updated: String,
    pub last_reported: String,
    pub attributes: Attributes,
}

impl SensorReading {
    /// The state as a whole number of lux, truncated toward zero.
    ///
    /// Values outside the `i64` range saturate and NaN becomes 0.
    pub fn lux(&self) -> Result<i64, SensorError> {
        let value: f64 = self
            .state
            .trim()
            .parse()
            .map_err(|source| SensorError::Parse {
                value: self.state.clone(),
                source,
            })?;
        Ok(value as i64)
    }
}

/// Anything that can produce the current light reading.
pub trait SensorSource {
    fn fetch(&self) -> Result<SensorReading, SensorError>;
}

pub struct HomeAssistant {
    client: Client,
    url: String,
    token: String,
}

impl HomeAssistant {
    pub fn new(config: &HaConfig) -> Result<Self, SensorError> {
        Ok(Self::with_client(config, Self::client_builder().build()?))
    }

    /// HTTP client settings. There is no request timeout.
    pub fn client_builder() -> ClientBuilder {
        Client::builder().timeout(None)
    }

    pub fn with_client(config: &HaConfig, client: Client) -> Self {
        HomeAssistant {
            client,
            url: Self::state_url(config),
            token: config.token.clone(),
        }
    }

    pub fn state_url(config: &HaConfig) -> String {
        format!(
            "http://{0}:{1}/api/states/{2}",
            config.address, config.port, config.entity
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SensorSource for HomeAssistant {
    fn fetch(&self) -> Result<SensorReading, SensorError> {
        tracing::debug!("GET {}", self.url);
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SensorError::Status(status));
        }

        let body = resp.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}
