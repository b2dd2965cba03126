use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use pedido_core::domain::notification::Channel;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("gateway rejected the send: {0}")]
    Rejected(String),
}

/// One delivery transport. Implementations carry no policy: no retries, no
/// rate limiting, no preference checks.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, recipient: &str, body: &str) -> Result<(), TransportError>;
}

/// Posts `{recipient, body}` to a per-channel HTTP gateway. Timeout is bound
/// at client construction; a timeout surfaces as a plain transport failure.
pub struct HttpGatewaySender {
    http: reqwest::Client,
    channel: Channel,
    url: String,
    token: Option<String>,
}

impl HttpGatewaySender {
    pub fn new(
        channel: Channel,
        url: String,
        token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        Ok(Self { http, channel, url, token })
    }
}

#[async_trait]
impl ChannelSender for HttpGatewaySender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), TransportError> {
        let mut request =
            self.http.post(&self.url).json(&json!({ "recipient": recipient, "body": body }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;
        if let Err(error) = response.error_for_status_ref() {
            return Err(TransportError::Rejected(error.to_string()));
        }
        Ok(())
    }
}

/// Logs instead of sending. Stands in for channels with no configured
/// gateway, so local runs work without any transport credentials.
pub struct NoopSender {
    channel: Channel,
}

impl NoopSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for NoopSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), TransportError> {
        debug!(
            event_name = "notify.noop_send",
            channel = self.channel.as_str(),
            recipient,
            body,
            "no gateway configured; send dropped"
        );
        Ok(())
    }
}
