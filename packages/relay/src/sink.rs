//! Webhook Sink
//!
//! Serializes notifications into webhook embeds and posts them to the
//! configured channel. All channels share one rate limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::format::tx_url;
use crate::limiter::RateLimiter;
use crate::notification::{ChannelKind, Notification};

/// Display name of the posting bot
pub const BOT_NAME: &str = "Tetu Parser";

pub const AVATAR_URL: &str = "https://i.ibb.co/Gcv8DK8/61-Vu-N0-Xdh4-L.jpg";

/// Upper bound on one HTTP exchange; the sink permit is held across a post
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during delivery
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One field of an embed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    /// Explorer link of the transaction
    pub url: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
}

/// Body posted to a webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

impl WebhookPayload {
    /// Build the payload of a notification
    ///
    /// # Arguments
    /// * `notification` - The notification to render
    /// * `scan_url` - Explorer web root used for the transaction link
    pub fn from_notification(notification: &Notification, scan_url: &str) -> Self {
        WebhookPayload {
            username: BOT_NAME.to_string(),
            avatar_url: AVATAR_URL.to_string(),
            embeds: vec![Embed {
                title: notification.title.clone(),
                url: tx_url(scan_url, &notification.transaction_hash),
                color: notification.color,
                fields: vec![EmbedField {
                    name: notification.short_name.clone(),
                    value: notification.body.clone(),
                    inline: true,
                }],
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// HTTP side of the sink
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SinkError>;
}

/// Build the HTTP client shared by the sink and the explorer client
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, SinkError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SinkError::Transport(e.to_string()))
}

/// `WebhookTransport` over a shared reqwest client
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SinkError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Rate-limited delivery of notifications to their channels
pub struct Sink {
    transport: Arc<dyn WebhookTransport>,
    webhooks: HashMap<ChannelKind, String>,
    scan_url: String,
    limiter: Arc<RateLimiter>,
}

impl Sink {
    /// Create a new sink
    ///
    /// # Arguments
    /// * `transport` - HTTP transport
    /// * `webhooks` - Destination URL per channel; missing channels are skipped
    /// * `scan_url` - Explorer web root for transaction links
    /// * `limiter` - Limiter shared by every channel
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        webhooks: HashMap<ChannelKind, String>,
        scan_url: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            transport,
            webhooks,
            scan_url: scan_url.into(),
            limiter,
        }
    }

    pub fn scan_url(&self) -> &str {
        &self.scan_url
    }

    /// Check if a channel has a destination
    pub fn is_configured(&self, kind: ChannelKind) -> bool {
        self.webhooks.contains_key(&kind)
    }

    /// Deliver a notification
    ///
    /// A no-op when the channel has no destination. Only successful posts
    /// count towards the rate limit; failures are logged and returned.
    pub async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        let Some(url) = self.webhooks.get(&notification.kind) else {
            debug!(
                channel = ?notification.kind,
                title = %notification.title,
                "No webhook configured, skipping"
            );
            return Ok(());
        };

        let payload = WebhookPayload::from_notification(notification, &self.scan_url);
        let permit = self.limiter.acquire().await;

        match self.transport.post(url, &payload).await {
            Ok(()) => {
                permit.record();
                info!(
                    channel = ?notification.kind,
                    tx = %notification.transaction_hash,
                    "Sent: {}",
                    notification.title
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    channel = ?notification.kind,
                    tx = %notification.transaction_hash,
                    "Failed to send notification: {}",
                    e
                );
                Err(e)
            }
        }
    }
}
