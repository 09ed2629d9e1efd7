//! The welcome message sent to new registrants.

/// Default sender address when `EMAIL_FROM_ADDRESS` is not set.
pub const DEFAULT_FROM_ADDRESS: &str = "noreply@onboard.local";

/// Default sender display name when `EMAIL_FROM_NAME` is not set.
pub const DEFAULT_FROM_NAME: &str = "Onboard";

/// Default subject line when `EMAIL_SUBJECT` is not set.
pub const DEFAULT_SUBJECT: &str = "Welcome aboard";

const WELCOME_TEXT: &str = "Welcome to our service. We're glad to have you!";

/// Sender identity and content of the welcome email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeEmail {
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
}

impl Default for WelcomeEmail {
    fn default() -> Self {
        Self {
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl WelcomeEmail {
    /// Load the sender identity from environment variables.
    ///
    /// | Variable             | Default                  |
    /// |----------------------|--------------------------|
    /// | `EMAIL_FROM_ADDRESS` | `noreply@onboard.local`  |
    /// | `EMAIL_FROM_NAME`    | `Onboard`                |
    /// | `EMAIL_SUBJECT`      | `Welcome aboard`         |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            from_address: std::env::var("EMAIL_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_name: std::env::var("EMAIL_FROM_NAME").unwrap_or(defaults.from_name),
            subject: std::env::var("EMAIL_SUBJECT").unwrap_or(defaults.subject),
        }
    }

    pub fn text_body(&self) -> &'static str {
        WELCOME_TEXT
    }

    pub fn html_body(&self) -> String {
        format!("<strong>{WELCOME_TEXT}</strong>")
    }

    /// RFC 5322 mailbox, e.g. `Onboard <noreply@onboard.local>`.
    pub fn mailbox(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_wraps_the_plain_text() {
        let email = WelcomeEmail::default();
        assert_eq!(
            email.html_body(),
            "<strong>Welcome to our service. We're glad to have you!</strong>"
        );
        assert!(email.html_body().contains(email.text_body()));
    }

    #[test]
    fn mailbox_parses_as_lettre_mailbox() {
        let email = WelcomeEmail::default();
        let mailbox: lettre::message::Mailbox = email.mailbox().parse().unwrap();
        assert_eq!(mailbox.email.to_string(), DEFAULT_FROM_ADDRESS);
        assert_eq!(mailbox.name.as_deref(), Some(DEFAULT_FROM_NAME));
    }
}
