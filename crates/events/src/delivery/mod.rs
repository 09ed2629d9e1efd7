//! Transports that deliver the welcome email.
//!
//! The worker picks one at startup: SendGrid when `SENDGRID_API_KEY` is set,
//! otherwise the SMTP relay when `SMTP_HOST` is set.

pub mod sendgrid;
pub mod smtp;
