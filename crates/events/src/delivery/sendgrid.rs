//! Welcome email delivery via the SendGrid v3 mail-send API.

use std::time::Duration;

use async_trait::async_trait;

use crate::notifier::{DeliveryError, Notifier};
use crate::template::WelcomeEmail;

/// Default mail-send endpoint.
pub const DEFAULT_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// HTTP request timeout for a single attempt. The dispatcher applies its own
/// per-attempt deadline on top of this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// SendGridConfig
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub api_url: String,
}

impl std::fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl SendGridConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SENDGRID_API_KEY` is unset or empty.
    ///
    /// | Variable           | Required | Default                                  |
    /// |--------------------|----------|------------------------------------------|
    /// | `SENDGRID_API_KEY` | yes      | —                                        |
    /// | `SENDGRID_API_URL` | no       | `https://api.sendgrid.com/v3/mail/send`  |
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SENDGRID_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        Some(Self {
            api_key,
            api_url: std::env::var("SENDGRID_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// SendGridNotifier
// ---------------------------------------------------------------------------

pub struct SendGridNotifier {
    client: reqwest::Client,
    config: SendGridConfig,
    template: WelcomeEmail,
}

impl SendGridNotifier {
    pub fn new(config: SendGridConfig, template: WelcomeEmail) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            config,
            template,
        })
    }

    /// JSON body for a single-recipient message.
    fn request_body(&self, address: &str) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{ "to": [{ "email": address }] }],
            "from": {
                "email": self.template.from_address,
                "name": self.template.from_name,
            },
            "subject": self.template.subject,
            "content": [
                { "type": "text/plain", "value": self.template.text_body() },
                { "type": "text/html", "value": self.template.html_body() },
            ],
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, address: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(address))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::info!(to = address, status = status.as_u16(), "Welcome email accepted by SendGrid");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
