//! Domain types shared by the onboarding notification crates.
//!
//! - [`types`]: primary key and timestamp aliases.
//! - [`event_types`]: well-known event type tags and dead-letter reasons.
//! - [`retry`]: the pure retry/escalate decision.
//! - [`registration`]: validated registration input and the event payload it
//!   produces.

pub mod error;
pub mod event_types;
pub mod registration;
pub mod retry;
pub mod types;

pub use error::CoreError;
pub use retry::{parse_retry_count, InvalidRetryCount, RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES};
