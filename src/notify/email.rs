use super::{Notification, Notifier, NotifyError};
use crate::config::EmailConfig;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP delivery with STARTTLS to every configured recipient.
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn mailbox(address: &str) -> Result<Mailbox, NotifyError> {
        address
            .parse()
            .map_err(|_| NotifyError::Address(address.to_string()))
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(Self::mailbox(&self.config.sender_email)?)
            .subject(notification.subject.as_str());

        for recipient in &self.config.recipients {
            builder = builder.to(Self::mailbox(recipient)?);
        }

        Ok(builder.multipart(MultiPart::alternative_plain_html(
            notification.text.clone(),
            notification.html.clone(),
        ))?)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;

        let creds = Credentials::new(
            self.config.sender_email.clone(),
            self.config.sender_password.clone(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_server)?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer.send(message).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyLevel;

    fn config(recipients: &[&str]) -> EmailConfig {
        EmailConfig {
            sender_email: "alerts@example.com".to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_enabled_only_with_sender_and_recipients() {
        assert!(!EmailNotifier::new(EmailConfig::default()).is_enabled());
        assert!(!EmailNotifier::new(config(&[])).is_enabled());
        assert!(EmailNotifier::new(config(&["ops@example.com"])).is_enabled());
    }

    #[test]
    fn test_message_addresses_every_recipient() {
        let notifier = EmailNotifier::new(config(&["a@example.com", "b@example.com"]));
        let n = Notification::new("Subject", "<p>hi</p>", "hi", NotifyLevel::Info);
        let raw = String::from_utf8(notifier.build_message(&n).unwrap().formatted()).unwrap();

        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("Subject: Subject"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_bad_recipient_is_reported() {
        let notifier = EmailNotifier::new(config(&["not an address"]));
        let n = Notification::new("s", "", "", NotifyLevel::Info);
        assert!(matches!(
            notifier.build_message(&n),
            Err(NotifyError::Address(_))
        ));
    }
}
