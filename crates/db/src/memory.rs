//! Process-local [`EventStore`].
//!
//! Mirrors the Postgres semantics (atomic claim, settle updates fenced by the
//! claimant, retry counter never decreases, idempotent dead-letter writes)
//! behind a single mutex. Fault switches let callers simulate an unreachable store or a
//! failing dead-letter sink.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use onboard_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::dead_letter::{DeadLetterEvent, NewDeadLetter};
use crate::models::event::{ClaimedEvent, Event, EventRow, StatusCounts};
use crate::models::status::{EventStatus, StatusId};
use crate::store::{settle_miss, EventStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    next_event_id: DbId,
    next_dead_letter_id: DbId,
    events: BTreeMap<DbId, EventRow>,
    dead_letters: Vec<DeadLetterEvent>,
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    dead_letter_writes_fail: AtomicBool,
    mutations: AtomicU64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make dead-letter inserts fail while the rest of the store works.
    pub fn fail_dead_letter_writes(&self, fail: bool) {
        self.dead_letter_writes_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Insert a row exactly as given, bypassing validation. Used to seed rows
    /// that other producers may have written (missing counters, odd statuses).
    pub fn insert_raw(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        status_id: StatusId,
        retry_count: Option<i32>,
    ) -> Result<DbId, StoreError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        inner.next_event_id += 1;
        let id = inner.next_event_id;
        inner.events.insert(
            id,
            EventRow {
                id,
                event_type: event_type.to_string(),
                payload,
                status_id,
                retry_count,
                claimed_by: None,
                claimed_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        self.touch();
        Ok(id)
    }

    /// Snapshot of all rows in the active collection, ordered by id.
    pub fn events(&self) -> Vec<EventRow> {
        self.inner
            .lock()
            .map(|inner| inner.events.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the dead-letter sink in insertion order.
    pub fn dead_letters(&self) -> Vec<DeadLetterEvent> {
        self.inner
            .lock()
            .map(|inner| inner.dead_letters.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn touch(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply `update` only while `claimed_by` holds the claim. Mirrors the
    /// `claimed_by = $2 AND status_id = processing` guard of the SQL updates.
    fn update_claimed(
        &self,
        id: DbId,
        claimed_by: Uuid,
        update: impl FnOnce(&mut EventRow),
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let held = inner.events.get(&id).is_some_and(|row| {
            row.status_id == EventStatus::Processing.id() && row.claimed_by == Some(claimed_by)
        });
        if !held {
            return settle_miss(id, inner.events.get(&id));
        }
        let Some(row) = inner.events.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        update(row);
        row.updated_at = Utc::now();
        drop(inner);
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Event, StoreError> {
        let id = self.insert_raw(event_type, payload.clone(), EventStatus::Pending.id(), Some(0))?;
        let row = self
            .lock()?
            .events
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        Event::try_from(row).map_err(|m| StoreError::Malformed {
            id,
            reason: m.defect.to_string(),
        })
    }

    async fn claim_next_pending(
        &self,
        claimed_by: Uuid,
    ) -> Result<Option<ClaimedEvent>, StoreError> {
        let mut inner = self.lock()?;
        let pending = EventStatus::Pending.id();
        let next_id = inner
            .events
            .values()
            .filter(|row| row.status_id == pending)
            .min_by_key(|row| (row.created_at, row.id))
            .map(|row| row.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let Some(row) = inner.events.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        row.status_id = EventStatus::Processing.id();
        row.claimed_by = Some(claimed_by);
        row.claimed_at = Some(now);
        row.updated_at = now;
        let claimed = row.clone();
        drop(inner);
        self.touch();
        Ok(Some(ClaimedEvent::from(claimed)))
    }

    async fn mark_processed(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError> {
        self.update_claimed(id, claimed_by, |row| {
            row.status_id = EventStatus::Processed.id();
            row.claimed_by = None;
            row.claimed_at = None;
        })
    }

    async fn mark_retried(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(retry_count).unwrap_or(i32::MAX);
        self.update_claimed(id, claimed_by, |row| {
            row.status_id = EventStatus::Pending.id();
            row.retry_count = Some(row.retry_count.unwrap_or(0).max(count));
            row.claimed_by = None;
            row.claimed_at = None;
        })
    }

    async fn mark_exhausted(
        &self,
        id: DbId,
        claimed_by: Uuid,
        retry_count: u32,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(retry_count).unwrap_or(i32::MAX);
        self.update_claimed(id, claimed_by, |row| {
            row.retry_count = Some(row.retry_count.unwrap_or(0).max(count));
        })
    }

    async fn insert_dead_letter(&self, record: &NewDeadLetter) -> Result<(), StoreError> {
        if self.dead_letter_writes_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("dead-letter sink rejected write".into()));
        }
        let mut inner = self.lock()?;
        if inner.dead_letters.iter().any(|dl| dl.event_id == record.event_id) {
            return Ok(());
        }
        inner.next_dead_letter_id += 1;
        let id = inner.next_dead_letter_id;
        inner.dead_letters.push(DeadLetterEvent {
            id,
            event_id: record.event_id,
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            retry_count: record.retry_count,
            last_error: record.last_error.clone(),
            failure_reason: record.failure_reason.clone(),
            event_created_at: record.event_created_at,
            failed_at: record.failed_at,
        });
        drop(inner);
        self.touch();
        Ok(())
    }

    async fn mark_dead_lettered(&self, id: DbId, claimed_by: Uuid) -> Result<(), StoreError> {
        self.update_claimed(id, claimed_by, |row| {
            row.status_id = EventStatus::DeadLettered.id();
            row.claimed_by = None;
            row.claimed_at = None;
        })
    }

    async fn requeue_stale(&self, claimed_before: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let processing = EventStatus::Processing.id();
        let mut released = 0;
        for row in inner.events.values_mut() {
            let stale = row.status_id == processing
                && row.claimed_at.is_some_and(|at| at < claimed_before);
            if stale {
                row.status_id = EventStatus::Pending.id();
                row.claimed_by = None;
                row.claimed_at = None;
                row.updated_at = now;
                released += 1;
            }
        }
        drop(inner);
        if released > 0 {
            self.touch();
        }
        Ok(released)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<EventRow>, StoreError> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterEvent>, StoreError> {
        let inner = self.lock()?;
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner.dead_letters.iter().rev().take(take).cloned().collect())
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let inner = self.lock()?;
        let mut counts = StatusCounts {
            dead_letter_sink: inner.dead_letters.len() as i64,
            ..Default::default()
        };
        for row in inner.events.values() {
            match EventStatus::try_from(row.status_id) {
                Ok(EventStatus::Pending) => counts.pending += 1,
                Ok(EventStatus::Processing) => counts.processing += 1,
                Ok(EventStatus::Processed) => counts.processed += 1,
                Ok(EventStatus::DeadLettered) => counts.dead_lettered += 1,
                Err(_) => {}
            }
        }
        Ok(counts)
    }
}
