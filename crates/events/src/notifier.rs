//! The delivery seam between the dispatcher and a transport.

use std::time::Duration;

use async_trait::async_trait;

/// Every way a single delivery attempt can fail.
///
/// The dispatcher does not distinguish between variants: any error counts as
/// one failed attempt against the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The HTTP request failed (network, DNS, TLS, client timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("Provider rejected message with HTTP {status}")]
    Rejected { status: u16 },

    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The attempt did not finish within the per-attempt deadline.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Delivers one welcome notification to a destination address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rejected() {
        let err = DeliveryError::Rejected { status: 401 };
        assert_eq!(err.to_string(), "Provider rejected message with HTTP 401");
    }

    #[test]
    fn display_timeout() {
        let err = DeliveryError::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "Delivery timed out after 15s");
    }

    #[test]
    fn display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = DeliveryError::from(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
