//! Onboarding notification infrastructure.
//!
//! This crate provides the I/O edges around the event engine:
//!
//! - [`Notifier`]: the delivery seam the dispatcher calls, with
//!   [`DeliveryError`] covering every way an attempt can fail.
//! - [`delivery`]: transports ([`SendGridNotifier`] over HTTP,
//!   [`SmtpNotifier`] over an SMTP relay).
//! - [`WelcomeEmail`]: the rendered welcome message shared by both
//!   transports.
//! - [`EventProducer`]: turns a registration into a durable pending event.

pub mod delivery;
pub mod notifier;
pub mod producer;
pub mod template;

pub use delivery::sendgrid::{SendGridConfig, SendGridNotifier};
pub use delivery::smtp::{EmailConfig, SmtpNotifier};
pub use notifier::{DeliveryError, Notifier};
pub use producer::{EventProducer, RegistrationError};
pub use template::WelcomeEmail;
