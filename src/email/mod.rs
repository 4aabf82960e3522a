//! Outbound notifications.
//!
//! Delivery is best effort: [`dispatch`] spawns the send and only logs a
//! failure, so the data change that triggered it is never rolled back or
//! delayed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::config::EmailConfig;

#[cfg(feature = "mail")]
mod smtp;
#[cfg(feature = "mail")]
pub use smtp::SmtpNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to send message: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RegistrationConfirmation {
        to: String,
        name: String,
    },
    /// `updated` distinguishes a replaced password from a first one.
    PasswordSet {
        to: String,
        name: String,
        updated: bool,
    },
    PasswordResetLink {
        to: String,
        name: String,
        token: String,
        valid_minutes: i64,
    },
    QuotationSent {
        to: String,
        name: String,
        title: String,
        description: Option<String>,
        amount: String,
        valid_until: NaiveDate,
    },
    InvoiceGenerated {
        to: String,
        name: String,
        invoice_number: String,
        total: String,
        due_date: NaiveDate,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Self::RegistrationConfirmation { to, .. }
            | Self::PasswordSet { to, .. }
            | Self::PasswordResetLink { to, .. }
            | Self::QuotationSent { to, .. }
            | Self::InvoiceGenerated { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmation { .. } => "registration_confirmation",
            Self::PasswordSet { updated: false, .. } => "password_set",
            Self::PasswordSet { updated: true, .. } => "password_updated",
            Self::PasswordResetLink { .. } => "password_reset_link",
            Self::QuotationSent { .. } => "quotation_sent",
            Self::InvoiceGenerated { .. } => "invoice_generated",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmation { .. } => "Welcome - Registration Complete",
            Self::PasswordSet { updated: false, .. } => "Your Account Password Has Been Set",
            Self::PasswordSet { updated: true, .. } => "Your Password Has Been Updated",
            Self::PasswordResetLink { .. } => "Password Reset Request",
            Self::QuotationSent { .. } => "New Quotation",
            Self::InvoiceGenerated { .. } => "New Invoice",
        }
    }

    pub fn body(&self, portal_url: &str) -> String {
        match self {
            Self::RegistrationConfirmation { name, .. } => format!(
                "Dear {name},\n\n\
                 Your account registration has been completed successfully.\n\n\
                 You can now log in to the customer portal at {portal_url} using your email \
                 address and the password you set during registration.\n\n\
                 From your account you can submit and track support tickets and keep your \
                 contact details up to date.\n\n\
                 Best regards,\n\
                 The Support Team"
            ),
            Self::PasswordSet { name, updated, .. } => {
                let what = if *updated {
                    "your password has been updated"
                } else {
                    "a password has been set for your account"
                };
                format!(
                    "Hello {name},\n\n\
                     This is to inform you that {what}.\n\n\
                     You can now log in at {portal_url} using your email address and the \
                     password provided to you by the administrator.\n\n\
                     If you didn't request this change, please contact your account \
                     administrator.\n\n\
                     Best regards,\n\
                     The Support Team"
                )
            }
            Self::PasswordResetLink {
                name,
                token,
                valid_minutes,
                ..
            } => format!(
                "Hello {name},\n\n\
                 We received a request to reset your password. Use the link below to choose \
                 a new one:\n\n\
                 {portal_url}/reset-password?token={token}\n\n\
                 The link expires in {valid_minutes} minutes and can be used once.\n\n\
                 If you didn't request a reset, you can ignore this email.\n\n\
                 Best regards,\n\
                 The Support Team"
            ),
            Self::QuotationSent {
                name,
                title,
                description,
                amount,
                valid_until,
                ..
            } => {
                let details = description
                    .as_deref()
                    .map(|d| format!("{d}\n\n"))
                    .unwrap_or_default();
                format!(
                    "Dear {name},\n\n\
                     We have prepared a quotation for you: {title}\n\n\
                     {details}\
                     Amount: ${amount}\n\
                     Valid until: {}\n\n\
                     You can review and accept or reject it in the portal at {portal_url}.\n\n\
                     Best regards,\n\
                     The Sales Team",
                    valid_until.format("%d/%m/%Y")
                )
            }
            Self::InvoiceGenerated {
                name,
                invoice_number,
                total,
                due_date,
                ..
            } => format!(
                "Dear {name},\n\n\
                 Invoice {invoice_number} has been issued to your account.\n\n\
                 Total: ${total}\n\
                 Due date: {}\n\n\
                 The full invoice is available in the portal at {portal_url}.\n\n\
                 Best regards,\n\
                 The Billing Team",
                due_date.format("%d/%m/%Y")
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Used when outbound email is disabled; records what would have been sent.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Email disabled, not sending {} to {}",
            notification.kind(),
            notification.recipient()
        );
        Ok(())
    }
}

/// Fire-and-forget delivery on the runtime.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notification).await {
            warn!(
                "Failed to deliver {} to {}: {e}",
                notification.kind(),
                notification.recipient()
            );
        }
    });
}

pub fn build_notifier(config: &EmailConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    if !config.enabled {
        info!("Outbound email disabled; notifications will be logged only");
        return Ok(Arc::new(LogNotifier));
    }

    #[cfg(feature = "mail")]
    {
        let notifier = SmtpNotifier::from_config(config)?;
        info!(
            "Outbound email via {}:{}",
            config.smtp_host, config.smtp_port
        );
        Ok(Arc::new(notifier))
    }

    #[cfg(not(feature = "mail"))]
    {
        warn!("email.enabled is set but the binary was built without the `mail` feature");
        Ok(Arc::new(LogNotifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn test_password_wording() {
        let set = Notification::PasswordSet {
            to: "a@x.io".into(),
            name: "Ana".into(),
            updated: false,
        };
        let updated = Notification::PasswordSet {
            to: "a@x.io".into(),
            name: "Ana".into(),
            updated: true,
        };
        assert!(set.body("http://portal").contains("a password has been set"));
        assert!(updated.body("http://portal").contains("your password has been updated"));
        assert_ne!(set.subject(), updated.subject());
        assert_eq!(updated.kind(), "password_updated");
    }

    #[test]
    fn test_registration_body_mentions_portal() {
        let n = Notification::RegistrationConfirmation {
            to: "a@x.io".into(),
            name: "Ana Lima".into(),
        };
        let body = n.body("https://crm.example.com");
        assert!(body.starts_with("Dear Ana Lima,"));
        assert!(body.contains("https://crm.example.com"));
        assert_eq!(n.recipient(), "a@x.io");
    }

    #[test]
    fn test_reset_link_carries_token() {
        let n = Notification::PasswordResetLink {
            to: "a@x.io".into(),
            name: "Ana".into(),
            token: "abc.def.ghi".into(),
            valid_minutes: 30,
        };
        let body = n.body("https://crm.example.com");
        assert!(body.contains("https://crm.example.com/reset-password?token=abc.def.ghi"));
        assert!(body.contains("30 minutes"));
        assert_eq!(n.kind(), "password_reset_link");
    }

    #[test]
    fn test_sales_bodies() {
        let quotation = Notification::QuotationSent {
            to: "a@x.io".into(),
            name: "Ana".into(),
            title: "Support plan".into(),
            description: None,
            amount: "1200.00".into(),
            valid_until: NaiveDate::from_ymd_opt(2024, 7, 1).expect("date"),
        };
        let body = quotation.body("http://portal");
        assert!(body.contains("Amount: $1200.00"));
        assert!(body.contains("Valid until: 01/07/2024"));

        let invoice = Notification::InvoiceGenerated {
            to: "a@x.io".into(),
            name: "Ana".into(),
            invoice_number: "INV-20240601-ABCDEF12".into(),
            total: "1080.00".into(),
            due_date: NaiveDate::from_ymd_opt(2024, 7, 1).expect("date"),
        };
        assert!(invoice.body("http://portal").contains("INV-20240601-ABCDEF12"));
        assert_eq!(invoice.subject(), "New Invoice");
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let notifier: Arc<dyn Notifier> = Arc::new(FailingNotifier {
            attempts: attempts.clone(),
        });

        dispatch(
            notifier,
            Notification::RegistrationConfirmation {
                to: "a@x.io".into(),
                name: "Ana".into(),
            },
        );

        for _ in 0..50 {
            if attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_config_builds_log_notifier() {
        let config = EmailConfig::default();
        assert!(build_notifier(&config).is_ok());
    }
}
