use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use tracing::info;

use super::{Notification, Notifier, NotifyError};
use crate::core::config::EmailConfig;

/// Sends notifications through an SMTP relay. Authenticated TLS relay when
/// credentials are configured, plain SMTP otherwise.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from: Mailbox,
    portal_url: String,
}

impl SmtpNotifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::Address(format!("{}: {e}", config.from)))?;

        let mailer = if !config.username.is_empty() && !config.password.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        };

        Ok(Self {
            mailer,
            from,
            portal_url: config.portal_url.clone(),
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to: Mailbox = notification
            .recipient()
            .parse()
            .map_err(|e| NotifyError::Address(format!("{}: {e}", notification.recipient())))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body(&self.portal_url))
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;
        let mailer = self.mailer.clone();

        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Transport(format!("Mail task failed: {e}")))?
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!(
            "Sent {} to {}",
            notification.kind(),
            notification.recipient()
        );
        Ok(())
    }
}
