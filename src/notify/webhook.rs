use super::{Notification, Notifier, NotifyError};
use crate::config::WebhookConfig;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Slack-compatible incoming webhook.
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(&self, notification: &Notification) -> Value {
        json!({
            "channel": self.config.channel,
            "text": notification.subject,
            "attachments": [{
                "color": notification.level.color(),
                "title": notification.subject,
                "text": notification.text,
                "ts": notification.timestamp.timestamp(),
            }]
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&self.build_payload(notification))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status().as_u16()))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }
}
