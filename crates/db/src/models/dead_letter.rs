//! Dead-letter sink models.

use chrono::Utc;
use onboard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::event::{Event, MalformedEvent};

/// A row from the `dead_letter_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeadLetterEvent {
    pub id: DbId,
    pub event_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub retry_count: Option<i32>,
    pub last_error: Option<String>,
    pub failure_reason: String,
    pub event_created_at: Timestamp,
    pub failed_at: Timestamp,
}

/// Insert DTO for the dead-letter sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDeadLetter {
    pub event_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub retry_count: Option<i32>,
    pub last_error: Option<String>,
    pub failure_reason: String,
    pub event_created_at: Timestamp,
    pub failed_at: Timestamp,
}

impl NewDeadLetter {
    /// Dead-letter a validated event.
    ///
    /// `retry_count` is passed separately because an exhausted event is
    /// archived with the counter that includes its final failed attempt.
    pub fn for_event(
        event: &Event,
        retry_count: u32,
        reason: impl Into<String>,
        last_error: Option<String>,
    ) -> Self {
        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            retry_count: Some(i32::try_from(retry_count).unwrap_or(i32::MAX)),
            last_error,
            failure_reason: reason.into(),
            event_created_at: event.created_at,
            failed_at: Utc::now(),
        }
    }

    /// Dead-letter a row that failed validation, keeping the stored counter
    /// as-is for inspection.
    pub fn for_malformed(malformed: &MalformedEvent) -> Self {
        Self {
            event_id: malformed.row.id,
            event_type: malformed.row.event_type.clone(),
            payload: malformed.row.payload.clone(),
            retry_count: malformed.row.retry_count,
            last_error: Some(malformed.defect.to_string()),
            failure_reason: malformed.defect.failure_reason().to_string(),
            event_created_at: malformed.row.created_at,
            failed_at: Utc::now(),
        }
    }
}
