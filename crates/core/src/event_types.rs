//! Well-known event type tags and dead-letter failure reasons.
//!
//! The tags must match the values written to `events.event_type`; the reasons
//! are stored verbatim in `dead_letter_events.failure_reason` and are what an
//! operator filters on when inspecting the dead-letter sink.

/// Emitted by the registration producer for every new account.
pub const USER_REGISTRATION: &str = "user_registration";

/// Payload field holding the destination email address.
pub const PAYLOAD_EMAIL: &str = "email";

/// Delivery kept failing until the retry budget ran out.
pub const REASON_MAX_RETRIES: &str = "delivery failed after max retries";

/// The stored retry counter was missing or not a non-negative integer.
pub const REASON_INVALID_RETRY_METADATA: &str = "invalid retry metadata";

/// The payload carries no deliverable address.
pub const REASON_MISSING_DESTINATION: &str = "missing destination address";
