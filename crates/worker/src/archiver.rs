//! Dead-letter escalation.
//!
//! The record is written to the sink first; the source event is marked
//! `dead_lettered` only once that write is confirmed. If the write fails the
//! event stays `processing` and the stale-claim sweep later returns it to
//! `pending`.

use std::sync::Arc;

use onboard_db::models::NewDeadLetter;
use onboard_db::{EventStore, StoreError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to write dead-letter record: {0}")]
    Write(#[source] StoreError),

    #[error("Dead-letter record written but source event not marked: {0}")]
    Mark(#[source] StoreError),
}

pub struct DeadLetterArchiver {
    store: Arc<dyn EventStore>,
}

impl DeadLetterArchiver {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Archive an event held by `claimed_by`. The source is only marked while
    /// that claim is still current.
    pub async fn archive(&self, record: NewDeadLetter, claimed_by: Uuid) -> Result<(), ArchiveError> {
        let event_id = record.event_id;

        if let Err(e) = self.store.insert_dead_letter(&record).await {
            tracing::error!(
                event_id,
                reason = %record.failure_reason,
                error = %e,
                "Failed to write dead-letter record, source event left in processing",
            );
            return Err(ArchiveError::Write(e));
        }

        if let Err(e) = self.store.mark_dead_lettered(event_id, claimed_by).await {
            tracing::error!(
                event_id,
                error = %e,
                "Dead-letter record written but source event could not be marked",
            );
            return Err(ArchiveError::Mark(e));
        }

        tracing::info!(
            event_id,
            retry_count = ?record.retry_count,
            reason = %record.failure_reason,
            "Event moved to dead-letter sink",
        );
        Ok(())
    }
}
