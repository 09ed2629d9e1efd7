//! Registration input and the `user_registration` event payload.
//!
//! The password is required at registration time but is deliberately absent
//! from [`UserRegistrationPayload`]: event payloads are copied verbatim into
//! the dead-letter sink and must not carry credentials.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Display name used when the registrant did not provide one.
pub const DEFAULT_DISPLAY_NAME: &str = "New User";

/// Registration request as received from the signup handler.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub name: Option<String>,
}

/// Payload stored on a `user_registration` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistrationPayload {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl RegisterUser {
    /// Normalise and validate the request, producing the event payload.
    ///
    /// The email is trimmed and lowercased before validation and doubles as
    /// the user id.
    pub fn into_payload(self) -> Result<UserRegistrationPayload, CoreError> {
        let normalized = Self {
            email: self.email.trim().to_lowercase(),
            ..self
        };
        normalized.validate()?;

        let name = normalized
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Ok(UserRegistrationPayload {
            user_id: normalized.email.clone(),
            email: normalized.email,
            name,
        })
    }
}

impl UserRegistrationPayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "user_id": self.user_id,
            "email": self.email,
            "name": self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request(email: &str, password: &str) -> RegisterUser {
        RegisterUser {
            email: email.to_string(),
            password: password.to_string(),
            name: None,
        }
    }

    #[test]
    fn email_is_lowercased_and_used_as_user_id() {
        let payload = request("  Alice@Example.COM ", "hunter2").into_payload().unwrap();
        assert_eq!(payload.email, "alice@example.com");
        assert_eq!(payload.user_id, "alice@example.com");
        assert_eq!(payload.name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn provided_name_is_kept() {
        let mut req = request("bob@example.com", "pw");
        req.name = Some(" Bob ".to_string());
        assert_eq!(req.into_payload().unwrap().name, "Bob");
    }

    #[test]
    fn missing_email_is_rejected() {
        assert_matches!(
            request("", "pw").into_payload(),
            Err(CoreError::Validation(msg)) if msg.contains("email")
        );
    }

    #[test]
    fn missing_password_is_rejected() {
        assert_matches!(
            request("carol@example.com", "").into_payload(),
            Err(CoreError::Validation(msg)) if msg.contains("password")
        );
    }

    #[test]
    fn payload_json_has_no_password() {
        let json = request("dave@example.com", "secret").into_payload().unwrap().to_json();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "dave@example.com");
    }
}
