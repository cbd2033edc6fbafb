// src/services/notifier.rs

//! Outbound change notifications.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{NotificationPayload, NotifierConfig};

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<()>;
}

/// Posts an embed-style JSON message to a webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    config: NotifierConfig,
}

impl WebhookNotifier {
    pub fn new(client: Client, config: NotifierConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        let message = payload.to_message(&self.config);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| AppError::notify(redact(&self.config.webhook_url), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notify(
                redact(&self.config.webhook_url),
                format!("HTTP {status}"),
            ));
        }

        log::info!(
            "Notification sent: {} → {}",
            payload.previous_build_id,
            payload.new_build_id
        );
        Ok(())
    }
}

/// Webhook URLs embed their secret in the path; keep only scheme and host.
fn redact(webhook_url: &str) -> String {
    match url::Url::parse(webhook_url) {
        Ok(url) => format!("{}://{}/…", url.scheme(), url.host_str().unwrap_or("")),
        Err(_) => "<invalid webhook url>".to_string(),
    }
}
