//! Alert delivery.
//!
//! Rendered [`Notification`]s are handed to a [`NotifyManager`], which
//! broadcasts them to every enabled transport. Transport failures are logged
//! and never reach the caller.

mod email;
mod render;
mod webhook;

pub use email::*;
pub use render::*;
pub use webhook::*;

use crate::config::MonitorConfig;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Notification transport errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address {0:?}")]
    Address(String),
    #[error("message build failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected the message with status {0}")]
    Status(u16),
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Critical,
    Error,
}

impl NotifyLevel {
    /// Attachment colour used by chat webhooks.
    pub fn color(&self) -> &'static str {
        match self {
            NotifyLevel::Info => "good",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Critical | NotifyLevel::Error => "danger",
        }
    }
}

/// A rendered message ready for any transport.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub level: NotifyLevel,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
        level: NotifyLevel,
    ) -> Self {
        Self {
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// A delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Fans notifications out to every enabled notifier.
#[derive(Default)]
pub struct NotifyManager {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the email and webhook notifiers described by the config.
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let mut manager = Self::new();
        manager.register(Box::new(EmailNotifier::new(cfg.email.clone())));
        manager.register(Box::new(WebhookNotifier::new(cfg.webhook.clone())));
        manager
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        if notifier.is_enabled() {
            tracing::info!("Registered notifier: {}", notifier.name());
        } else {
            tracing::info!("Notifier {} is not configured; skipping", notifier.name());
        }
        self.notifiers.push(notifier);
    }

    pub fn enabled_count(&self) -> usize {
        self.notifiers.iter().filter(|n| n.is_enabled()).count()
    }

    /// Send to every enabled notifier. Returns how many deliveries succeeded.
    pub async fn broadcast(&self, notification: &Notification) -> usize {
        if self.enabled_count() == 0 {
            tracing::warn!(
                "No notifier configured; dropping \"{}\"",
                notification.subject
            );
            return 0;
        }

        let mut delivered = 0;
        for notifier in self.notifiers.iter().filter(|n| n.is_enabled()) {
            match notifier.send(notification).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        "Notification sent via {}: {}",
                        notifier.name(),
                        notification.subject
                    );
                }
                Err(e) => {
                    tracing::error!("Notification error via {}: {}", notifier.name(), e);
                }
            }
        }
        delivered
    }
}
