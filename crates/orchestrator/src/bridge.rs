//! JSON-over-HTTP client for the host-side bridge process that owns the
//! engine's COM session and the desktop.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge unreachable: {0}")]
    Connect(String),

    #[error("Bridge request failed: {0}")]
    Transport(String),

    #[error("Invalid bridge response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFault {
    pub class: String,
    #[serde(default)]
    pub code: i32,
}

/// Reply envelope of every bridge endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub fault: Option<WireFault>,
}

impl Envelope {
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, BridgeError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))
    }
}

#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    client: Client,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Envelope, BridgeError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<Envelope>(&text) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(BridgeError::Transport(format!(
                "Status {}: {}",
                status, text
            ))),
            Err(e) => Err(BridgeError::InvalidResponse(e.to_string())),
        }
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
