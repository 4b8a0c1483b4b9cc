use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::client::ConnectionId;
use crate::config::{RelayMode, RelaySettings, clamp_capacity};
use crate::hub::ChatMessage;
use crate::relay::record::{Confirmation, PersistRequest};
use crate::utils::error::HubError;

/// Longest slice of an error response body kept for logging.
const MAX_ERROR_BODY: usize = 200;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("relay disabled: no persistence endpoint configured")]
    Disabled,

    #[error("invalid persistence endpoint {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("persistence endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed confirmation: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client for the persistence endpoint.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: Option<Url>,
}

impl RelayClient {
    pub fn new(settings: &RelaySettings) -> Result<Self, RelayError> {
        let endpoint = settings
            .url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|e| RelayError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let mut builder = reqwest::Client::builder();
        if settings.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(settings.timeout_ms));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// POSTs the message to the persistence endpoint and decodes the confirmation.
    ///
    /// Any non-2xx status or undecodable body is an error.
    pub async fn send(&self, msg: &ChatMessage) -> Result<Confirmation, RelayError> {
        let Some(endpoint) = &self.endpoint else {
            return Err(RelayError::Disabled);
        };

        let response = self
            .http
            .post(endpoint.clone())
            .json(&PersistRequest::from(msg))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body);
            return Err(RelayError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Best-effort relay used by connection readers.
///
/// In `Inline` mode the caller waits for the round trip. In `Detached` mode
/// the call is spawned, with at most `max_in_flight` calls outstanding; once
/// that many are running, `submit` waits for a free slot before spawning.
#[derive(Debug, Clone)]
pub struct Relay {
    client: RelayClient,
    mode: RelayMode,
    permits: Arc<Semaphore>,
}

impl Relay {
    pub fn new(settings: &RelaySettings) -> Result<Self, RelayError> {
        Ok(Self {
            client: RelayClient::new(settings)?,
            mode: settings.mode,
            permits: Arc::new(Semaphore::new(clamp_capacity(settings.max_in_flight))),
        })
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    pub fn is_enabled(&self) -> bool {
        self.client.endpoint().is_some()
    }

    /// Relays the message, logging and swallowing any failure.
    pub async fn submit(&self, origin: &ConnectionId, msg: &ChatMessage) {
        if !self.is_enabled() {
            return;
        }

        match self.mode {
            RelayMode::Inline => {
                forward(&self.client, origin, msg).await;
            }
            RelayMode::Detached => {
                let Ok(permit) = self.permits.clone().acquire_owned().await else {
                    return;
                };
                let client = self.client.clone();
                let origin = origin.clone();
                let msg = msg.clone();
                tokio::spawn(async move {
                    forward(&client, &origin, &msg).await;
                    drop(permit);
                });
            }
        }
    }
}

async fn forward(client: &RelayClient, origin: &ConnectionId, msg: &ChatMessage) {
    match client.send(msg).await {
        Ok(confirmation) => {
            debug!(
                conn = %origin,
                channel = %msg.channel_id,
                record = %confirmation.id,
                stored = confirmation.messages.len(),
                "message persisted"
            );
        }
        Err(e) => {
            warn!(
                conn = %origin,
                channel = %msg.channel_id,
                "{}; broadcasting anyway",
                HubError::from(e)
            );
        }
    }
}
