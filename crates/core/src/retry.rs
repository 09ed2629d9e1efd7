//! Retry bookkeeping for failed deliveries.
//!
//! [`RetryPolicy::decide`] is a pure function of the retry counter. The
//! dispatcher calls it with the counter *after* incrementing it for the failed
//! attempt, so an event that has already failed `max_retries` times gets
//! exactly one more attempt before it is escalated.

/// Retry budget used when `MAX_RETRIES` is not configured.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Outcome of consulting the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the event to the pending pool.
    RetryLater,
    /// Move the event to the dead-letter sink.
    Escalate,
}

/// A stored retry counter that cannot be interpreted as a non-negative
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid retry counter: {raw:?}")]
pub struct InvalidRetryCount {
    pub raw: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Escalate once the counter is strictly greater than `max_retries`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count > self.max_retries {
            RetryDecision::Escalate
        } else {
            RetryDecision::RetryLater
        }
    }

    /// Whether a counter read from the store is already past the budget.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        self.decide(retry_count) == RetryDecision::Escalate
    }
}

/// Validate a raw counter read from storage.
///
/// Missing and negative values are data-integrity errors; they are never
/// coerced to zero, which would let a broken record retry forever.
pub fn parse_retry_count(raw: Option<i64>) -> Result<u32, InvalidRetryCount> {
    raw.and_then(|n| u32::try_from(n).ok())
        .ok_or(InvalidRetryCount { raw })
}
