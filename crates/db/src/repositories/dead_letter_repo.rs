//! Repository for the `dead_letter_events` table.

use sqlx::PgPool;

use crate::models::dead_letter::{DeadLetterEvent, NewDeadLetter};

/// Column list for `dead_letter_events` queries.
const COLUMNS: &str = "\
    id, event_id, event_type, payload, retry_count, last_error, \
    failure_reason, event_created_at, failed_at";

/// Maximum page size for dead-letter listing.
const MAX_LIMIT: i64 = 500;

pub struct DeadLetterRepo;

impl DeadLetterRepo {
    /// Write a dead-letter copy of an event.
    ///
    /// Idempotent per `event_id`: a second archival of the same event (after
    /// a crash between this write and the source update) keeps the first row.
    pub async fn insert(pool: &PgPool, record: &NewDeadLetter) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO dead_letter_events \
                 (event_id, event_type, payload, retry_count, last_error, \
                  failure_reason, event_created_at, failed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(record.event_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.retry_count)
        .bind(&record.last_error)
        .bind(&record.failure_reason)
        .bind(record.event_created_at)
        .bind(record.failed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Most recent dead letters first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<DeadLetterEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM dead_letter_events \
             ORDER BY failed_at DESC, id DESC \
             LIMIT $1"
        );
        sqlx::query_as::<_, DeadLetterEvent>(&query)
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }
}
