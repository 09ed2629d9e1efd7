//! Welcome email delivery via an SMTP relay.
//!
//! [`SmtpNotifier`] wraps the `lettre` async SMTP transport. Configuration is
//! loaded from environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and no mailer should be
//! constructed.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::notifier::{DeliveryError, Notifier};
use crate::template::WelcomeEmail;

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that SMTP
    /// delivery is not configured.
    ///
    /// | Variable         | Required | Default |
    /// |------------------|----------|---------|
    /// | `SMTP_HOST`      | yes      | —       |
    /// | `SMTP_PORT`      | no       | `587`   |
    /// | `SMTP_USER`      | no       | —       |
    /// | `SMTP_PASSWORD`  | no       | —       |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpNotifier
// ---------------------------------------------------------------------------

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    template: WelcomeEmail,
}

impl SmtpNotifier {
    /// Build the transport. No connection is opened until the first send.
    pub fn new(config: &EmailConfig, template: WelcomeEmail) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            template,
        })
    }

    fn build_message(&self, address: &str) -> Result<Message, DeliveryError> {
        let from: Mailbox = self.template.mailbox().parse()?;
        let to: Mailbox = address.parse()?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.template.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                self.template.text_body().to_string(),
                self.template.html_body(),
            ))
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, address: &str) -> Result<(), DeliveryError> {
        let message = self.build_message(address)?;
        self.mailer.send(message).await?;

        tracing::info!(to = address, "Welcome email sent via SMTP");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
