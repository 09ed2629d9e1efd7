//! The event store seam.
//!
//! [`EventStore`] is what the dispatcher, archiver and producer are written
//! against. It owns both logical sinks: the active `events` queue and the
//! dead-letter collection.

use async_trait::async_trait;
use onboard_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::dead_letter::{DeadLetterEvent, NewDeadLetter};
use crate::models::event::{ClaimedEvent, Event, EventRow, StatusCounts};
use crate::models::status::EventStatus;
use crate::repositories::{DeadLetterRepo, EventRepo};
use crate::DbPool;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connectivity loss, pool exhaustion or timeout. Worth retrying.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Event not found: {0}")]
    NotFound(DbId),

    /// The caller's claim expired and the event was released or re-claimed.
    #[error("Claim on event {0} is no longer held")]
    ClaimLost(DbId),

    /// A freshly inserted row failed validation on the way back out.
    #[error("Malformed event {id}: {reason}")]
    Malformed { id: DbId, reason: String },

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Database(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a pending event with `retry_count = 0`.
    async fn create(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Event, StoreError>;

    /// Atomically move the oldest pending event to `processing`.
    ///
    /// `Ok(None)` means the queue is empty.
    async fn claim_next_pending(&self, claimed_by: Uuid)
        -> Result<Option<ClaimedEvent>, StoreError>;

    // The settle operations below only apply to an event still claimed by
    // `claimed_by`. A terminal event is left alone and reported as success;
    // any other mismatch is `StoreError::ClaimLost`.

    async fn mark_processed(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError>;

    /// Back to `pending` with `retry_count` (never lowered), claim cleared.
    async fn mark_retried(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError>;

    /// Persist a final counter while keeping the claim, ahead of archiving.
    /// A later re-claim sees the exhausted counter and does not resend.
    async fn mark_exhausted(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError>;

    /// Write into the dead-letter sink. Idempotent per `event_id`.
    async fn insert_dead_letter(&self, record: &NewDeadLetter) -> Result<(), StoreError>;

    /// Mark the source event once its dead-letter copy is confirmed.
    async fn mark_dead_lettered(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError>;

    /// Release claims taken before `claimed_before`; returns how many.
    async fn requeue_stale(&self, claimed_before: Timestamp) -> Result<u64, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<EventRow>, StoreError>;

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterEvent>, StoreError>;

    async fn status_counts(&self) -> Result<StatusCounts, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`EventStore`] backed by the `events` and `dead_letter_events` tables.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn create(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Event, StoreError> {
        let row = EventRepo::insert(&self.pool, event_type, payload).await?;
        Event::try_from(row).map_err(|m| StoreError::Malformed {
            id: m.row.id,
            reason: m.defect.to_string(),
        })
    }

    async fn claim_next_pending(
        &self,
        claimed_by: Uuid,
    ) -> Result<Option<ClaimedEvent>, StoreError> {
        let row = EventRepo::claim_next(&self.pool, claimed_by).await?;
        Ok(row.map(ClaimedEvent::from))
    }

    async fn mark_processed(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError> {
        if !EventRepo::mark_processed(&self.pool, id, claimed_by).await? {
            self.explain_miss(id).await?;
        }
        Ok(())
    }

    async fn mark_retried(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(retry_count).unwrap_or(i32::MAX);
        if !EventRepo::mark_retried(&self.pool, id, claimed_by, count).await? {
            self.explain_miss(id).await?;
        }
        Ok(())
    }

    async fn mark_exhausted(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(retry_count).unwrap_or(i32::MAX);
        if !EventRepo::mark_exhausted(&self.pool, id, claimed_by, count).await? {
            self.explain_miss(id).await?;
        }
        Ok(())
    }

    async fn insert_dead_letter(&self, record: &NewDeadLetter) -> Result<(), StoreError> {
        DeadLetterRepo::insert(&self.pool, record).await?;
        Ok(())
    }

    async fn mark_dead_lettered(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError> {
        if !EventRepo::mark_dead_lettered(&self.pool, id, claimed_by).await? {
            self.explain_miss(id).await?;
        }
        Ok(())
    }

    async fn requeue_stale(&self, claimed_before: Timestamp) -> Result<u64, StoreError> {
        Ok(EventRepo::requeue_stale(&self.pool, claimed_before).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<EventRow>, StoreError> {
        Ok(EventRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterEvent>, StoreError> {
        Ok(DeadLetterRepo::list_recent(&self.pool, limit).await?)
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        Ok(EventRepo::status_counts(&self.pool).await?)
    }
}

impl PgEventStore {
    /// Classify a settle update that touched no row.
    async fn explain_miss(&self, id: DbId) -> Result<(), StoreError> {
        let row = EventRepo::find_by_id(&self.pool, id).await?;
        settle_miss(id, row.as_ref())
    }
}

/// Shared by both stores: missing row, terminal row (idempotent success), or
/// a claim held by someone else.
pub(crate) fn settle_miss(id: DbId, row: Option<&EventRow>) -> Result<(), StoreError> {
    match row {
        None => Err(StoreError::NotFound(id)),
        Some(row) if EventStatus::try_from(row.status_id).is_ok_and(EventStatus::is_terminal) => {
            Ok(())
        }
        Some(_) => Err(StoreError::ClaimLost(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn row_not_found_is_not_transient() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn claim_lost_is_not_transient() {
        assert!(!StoreError::ClaimLost(3).is_transient());
    }
}
