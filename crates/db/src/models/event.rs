//! Event entity models.
//!
//! [`EventRow`] mirrors the `events` table column for column and accepts
//! whatever is stored. [`Event`] is the typed view the dispatcher works with;
//! rows that cannot be converted are surfaced as [`MalformedEvent`] so they
//! can be quarantined rather than processed on a guessed counter.

use onboard_core::event_types::{PAYLOAD_EMAIL, REASON_INVALID_RETRY_METADATA};
use onboard_core::retry::{parse_retry_count, InvalidRetryCount};
use onboard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::status::StatusId;

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventRow {
    pub id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub retry_count: Option<i32>,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A validated event.
///
/// Carries no status: it is only produced for rows just inserted (`pending`)
/// or just claimed (`processing`), so the status is known from the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub claimed_by: Option<Uuid>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Why a stored row could not be turned into an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventDefect {
    #[error(transparent)]
    InvalidRetryCount(#[from] InvalidRetryCount),
}

impl EventDefect {
    /// Failure reason recorded when the row is dead-lettered.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            EventDefect::InvalidRetryCount(_) => REASON_INVALID_RETRY_METADATA,
        }
    }
}

/// A stored row that failed validation.
#[derive(Debug, Clone)]
pub struct MalformedEvent {
    pub row: EventRow,
    pub defect: EventDefect,
}

/// Result of a successful claim.
#[derive(Debug, Clone)]
pub enum ClaimedEvent {
    Ready(Event),
    Malformed(MalformedEvent),
}

impl ClaimedEvent {
    pub fn id(&self) -> DbId {
        match self {
            ClaimedEvent::Ready(event) => event.id,
            ClaimedEvent::Malformed(malformed) => malformed.row.id,
        }
    }
}

impl From<EventRow> for ClaimedEvent {
    fn from(row: EventRow) -> Self {
        match Event::try_from(row) {
            Ok(event) => ClaimedEvent::Ready(event),
            Err(malformed) => ClaimedEvent::Malformed(malformed),
        }
    }
}

impl TryFrom<EventRow> for Event {
    type Error = MalformedEvent;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let retry_count = match parse_retry_count(row.retry_count.map(i64::from)) {
            Ok(count) => count,
            Err(e) => {
                return Err(MalformedEvent {
                    row,
                    defect: e.into(),
                })
            }
        };

        Ok(Event {
            id: row.id,
            event_type: row.event_type,
            payload: row.payload,
            retry_count,
            claimed_by: row.claimed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Event {
    /// Destination address carried in the payload, if any.
    pub fn destination(&self) -> Option<&str> {
        self.payload
            .get(PAYLOAD_EMAIL)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Row counts per status, plus the size of the dead-letter sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub processed: i64,
    pub dead_lettered: i64,
    pub dead_letter_sink: i64,
}
