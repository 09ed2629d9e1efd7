//! Repository for the `events` table.
//!
//! Uses `EventStatus` from `models::status` for every status literal. The
//! settle updates require the row to be `processing` under the caller's
//! claim, so a dispatcher whose claim expired cannot overwrite the outcome of
//! the dispatcher that re-claimed the event.

use onboard_core::types::{DbId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::event::{EventRow, StatusCounts};
use crate::models::status::{EventStatus, StatusId};

/// Column list for `events` queries.
const COLUMNS: &str = "\
    id, event_type, payload, status_id, retry_count, \
    claimed_by, claimed_at, created_at, updated_at";

/// Provides queue operations for notification events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new pending event with a zero retry counter.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<EventRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (event_type, payload, status_id, retry_count) \
             VALUES ($1, $2, $3, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(event_type)
            .bind(payload)
            .bind(EventStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending event.
    ///
    /// The status guard and the transition happen in one statement; `SKIP
    /// LOCKED` lets concurrent dispatchers pass over a row another one is
    /// already claiming instead of blocking on it.
    pub async fn claim_next(
        pool: &PgPool,
        claimed_by: Uuid,
    ) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!(
            "UPDATE events \
             SET status_id = $2, claimed_by = $1, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM events \
                 WHERE status_id = $3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(claimed_by)
            .bind(EventStatus::Processing.id())
            .bind(EventStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark an event processed.
    ///
    /// Applies only while `claimed_by` still holds the claim; returns whether
    /// a row was updated.
    pub async fn mark_processed(
        pool: &PgPool,
        id: DbId,
        claimed_by: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events \
             SET status_id = $3, claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND status_id = $4",
        )
        .bind(id)
        .bind(claimed_by)
        .bind(EventStatus::Processed.id())
        .bind(EventStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return a claimed event to the pending pool with a new retry counter.
    ///
    /// The counter never goes down: `GREATEST` keeps the stored value when a
    /// stale caller passes a smaller one.
    pub async fn mark_retried(
        pool: &PgPool,
        id: DbId,
        claimed_by: Uuid,
        retry_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events \
             SET status_id = $3, retry_count = GREATEST(COALESCE(retry_count, 0), $5), \
                 claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND status_id = $4",
        )
        .bind(id)
        .bind(claimed_by)
        .bind(EventStatus::Pending.id())
        .bind(EventStatus::Processing.id())
        .bind(retry_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the final retry counter of a claimed event without releasing it.
    pub async fn mark_exhausted(
        pool: &PgPool,
        id: DbId,
        claimed_by: Uuid,
        retry_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events \
             SET retry_count = GREATEST(COALESCE(retry_count, 0), $4), updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND status_id = $3",
        )
        .bind(id)
        .bind(claimed_by)
        .bind(EventStatus::Processing.id())
        .bind(retry_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a claimed event dead-lettered once its archive copy exists.
    pub async fn mark_dead_lettered(
        pool: &PgPool,
        id: DbId,
        claimed_by: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events \
             SET status_id = $3, claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND status_id = $4",
        )
        .bind(id)
        .bind(claimed_by)
        .bind(EventStatus::DeadLettered.id())
        .bind(EventStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return events stuck in `processing` since before `claimed_before` to
    /// the pending pool. The retry counter is left untouched.
    pub async fn requeue_stale(
        pool: &PgPool,
        claimed_before: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events \
             SET status_id = $1, claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE status_id = $2 AND claimed_at < $3",
        )
        .bind(EventStatus::Pending.id())
        .bind(EventStatus::Processing.id())
        .bind(claimed_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find an event by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count events per status, plus rows in the dead-letter sink.
    pub async fn status_counts(pool: &PgPool) -> Result<StatusCounts, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> =
            sqlx::query_as("SELECT status_id, COUNT(*) FROM events GROUP BY status_id")
                .fetch_all(pool)
                .await?;
        let (sink,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dead_letter_events")
            .fetch_one(pool)
            .await?;

        let mut counts = StatusCounts {
            dead_letter_sink: sink,
            ..Default::default()
        };
        for (status_id, count) in rows {
            match EventStatus::try_from(status_id) {
                Ok(EventStatus::Pending) => counts.pending = count,
                Ok(EventStatus::Processing) => counts.processing = count,
                Ok(EventStatus::Processed) => counts.processed = count,
                Ok(EventStatus::DeadLettered) => counts.dead_lettered = count,
                Err(unknown) => {
                    tracing::warn!(status_id = unknown, count, "Events with unknown status id");
                }
            }
        }
        Ok(counts)
    }
}
