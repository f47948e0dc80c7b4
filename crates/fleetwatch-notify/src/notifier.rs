//! Webhook notifier.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on a single webhook delivery.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected message with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Delivers messages to an optional webhook.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    /// Fails when the HTTP client cannot be initialized (e.g. TLS backend).
    pub fn new(webhook_url: Option<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, webhook_url))
    }

    pub fn with_client(client: reqwest::Client, webhook_url: Option<String>) -> Self {
        // Treat an empty setting as unset.
        let webhook_url = webhook_url.filter(|u| !u.trim().is_empty());
        Self {
            client,
            webhook_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Send `message`, swallowing every failure.
    ///
    /// Returns whether the webhook accepted the message.
    pub async fn notify(&self, message: &str) -> bool {
        let Some(url) = self.webhook_url.as_deref() else {
            info!("no webhook configured, notification skipped");
            return false;
        };

        match self.deliver(url, message).await {
            Ok(()) => {
                debug!(bytes = message.len(), "notification delivered");
                true
            }
            Err(e) => {
                warn!(error = %e, "notification delivery failed");
                false
            }
        }
    }

    /// Send `message` on a detached task.
    pub fn notify_detached(&self, message: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.notify(&message).await;
        });
    }

    async fn deliver(&self, url: &str, message: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .json(&WebhookPayload { text: message })
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status))
        }
    }
}
