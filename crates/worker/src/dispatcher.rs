//! Event dispatcher.
//!
//! Claims one pending event at a time via
//! [`EventStore::claim_next_pending`], hands its destination to the
//! [`Notifier`], and settles the event according to the [`RetryPolicy`].
//! Claims are atomic in the store, so any number of dispatchers (in this
//! process or others) can share one queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use onboard_core::event_types::{REASON_MAX_RETRIES, REASON_MISSING_DESTINATION};
use onboard_core::types::DbId;
use onboard_core::{RetryDecision, RetryPolicy};
use onboard_db::models::{ClaimedEvent, Event, MalformedEvent, NewDeadLetter};
use onboard_db::{EventStore, StoreError};
use onboard_events::{DeliveryError, Notifier};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archiver::DeadLetterArchiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Sleep after a poll that found nothing.
    pub poll_interval: Duration,
    /// Sleep after a store error or an attempt that did not settle cleanly.
    pub error_backoff: Duration,
    /// Deadline for a single notifier call.
    pub delivery_timeout: Duration,
    /// A `processing` claim older than this is considered abandoned.
    pub claim_lease: Duration,
    pub stale_sweep_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(15),
            claim_lease: Duration::from_secs(300),
            stale_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// How a claimed event was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered and marked `processed`.
    Completed,
    /// Delivery failed; back to `pending` with the new counter.
    Requeued { retry_count: u32 },
    /// Moved to the dead-letter sink.
    DeadLettered { reason: String },
    /// Escalation failed; the event stays `processing` until the stale sweep.
    ArchiveFailed,
    /// The final status update failed or the claim was lost to another
    /// dispatcher; the event is left to the stale sweep or its new claimant.
    UpdateFailed,
}

/// Result of one claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Worked { event_id: DbId, outcome: Outcome },
}

pub struct Dispatcher {
    id: Uuid,
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    archiver: DeadLetterArchiver,
    policy: RetryPolicy,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            archiver: DeadLetterArchiver::new(Arc::clone(&store)),
            store,
            notifier,
            policy,
            config,
        }
    }

    /// Identity recorded in `claimed_by` for events this dispatcher holds.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    ///
    /// Cancellation is honoured between iterations and while sleeping, never
    /// in the middle of a delivery: an attempt that has started is always
    /// settled before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            dispatcher_id = %self.id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retries = self.policy.max_retries,
            "Dispatcher started",
        );

        self.sweep().await;
        let mut last_sweep = Instant::now();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if last_sweep.elapsed() >= self.config.stale_sweep_interval {
                self.sweep().await;
                last_sweep = Instant::now();
            }

            let pause = match self.tick().await {
                Ok(Tick::Worked {
                    outcome: Outcome::Completed | Outcome::DeadLettered { .. },
                    ..
                }) => None,
                Ok(Tick::Worked { .. }) => Some(self.config.error_backoff),
                Ok(Tick::Idle) => Some(self.config.poll_interval),
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(dispatcher_id = %self.id, error = %e, "Event store unavailable, backing off");
                    } else {
                        tracing::error!(dispatcher_id = %self.id, error = %e, "Failed to claim event, backing off");
                    }
                    Some(self.config.error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        tracing::info!(dispatcher_id = %self.id, "Dispatcher shutting down");
    }

    /// Claim and settle at most one event.
    ///
    /// Only the claim itself can fail; errors while settling are logged and
    /// reported through [`Outcome`].
    pub async fn tick(&self) -> Result<Tick, StoreError> {
        let Some(claimed) = self.store.claim_next_pending(self.id).await? else {
            return Ok(Tick::Idle);
        };

        let event_id = claimed.id();
        let outcome = match claimed {
            ClaimedEvent::Ready(event) => self.process(event).await,
            ClaimedEvent::Malformed(malformed) => self.quarantine(malformed).await,
        };
        Ok(Tick::Worked { event_id, outcome })
    }

    /// Return `processing` events whose claim outlived the lease to `pending`.
    pub async fn sweep_stale(&self) -> Result<u64, StoreError> {
        let cutoff = chrono::Duration::from_std(self.config.claim_lease)
            .ok()
            .and_then(|lease| Utc::now().checked_sub_signed(lease));
        match cutoff {
            Some(cutoff) => self.store.requeue_stale(cutoff).await,
            None => Ok(0),
        }
    }

    async fn sweep(&self) {
        match self.sweep_stale().await {
            Ok(0) => {}
            Ok(released) => {
                tracing::info!(dispatcher_id = %self.id, released, "Requeued stale event claims");
            }
            Err(e) => {
                tracing::warn!(dispatcher_id = %self.id, error = %e, "Stale claim sweep failed");
            }
        }
    }

    async fn process(&self, event: Event) -> Outcome {
        if self.policy.is_exhausted(event.retry_count) {
            tracing::warn!(
                event_id = event.id,
                retry_count = event.retry_count,
                "Claimed event already past retry budget",
            );
            let record = NewDeadLetter::for_event(&event, event.retry_count, REASON_MAX_RETRIES, None);
            return self.escalate(record).await;
        }

        let Some(address) = event.destination() else {
            tracing::warn!(event_id = event.id, "Event payload has no destination address");
            let record =
                NewDeadLetter::for_event(&event, event.retry_count, REASON_MISSING_DESTINATION, None);
            return self.escalate(record).await;
        };

        tracing::debug!(event_id = event.id, retry_count = event.retry_count, "Delivering event");

        match self.deliver(address).await {
            Ok(()) => match self.store.mark_processed(event.id, self.id).await {
                Ok(()) => {
                    tracing::info!(event_id = event.id, retry_count = event.retry_count, "Event processed");
                    Outcome::Completed
                }
                Err(StoreError::ClaimLost(_)) => {
                    tracing::warn!(event_id = event.id, dispatcher_id = %self.id, "Delivered after claim expired, leaving event to its new claimant");
                    Outcome::UpdateFailed
                }
                Err(e) => {
                    tracing::error!(event_id = event.id, error = %e, "Delivered but failed to mark event processed");
                    Outcome::UpdateFailed
                }
            },
            Err(delivery_error) => {
                let next = event.retry_count.saturating_add(1);
                tracing::warn!(
                    event_id = event.id,
                    retry_count = next,
                    error = %delivery_error,
                    "Delivery attempt failed",
                );

                match self.policy.decide(next) {
                    RetryDecision::RetryLater => match self.store.mark_retried(event.id, self.id, next).await {
                        Ok(()) => Outcome::Requeued { retry_count: next },
                        Err(StoreError::ClaimLost(_)) => {
                            tracing::warn!(event_id = event.id, dispatcher_id = %self.id, "Claim expired before requeue, leaving event to its new claimant");
                            Outcome::UpdateFailed
                        }
                        Err(e) => {
                            tracing::error!(event_id = event.id, error = %e, "Failed to requeue event");
                            Outcome::UpdateFailed
                        }
                    },
                    RetryDecision::Escalate => {
                        // Persist the spent budget first so a re-claim after a
                        // failed archive escalates without sending again.
                        match self.store.mark_exhausted(event.id, self.id, next).await {
                            Ok(()) => {}
                            Err(StoreError::ClaimLost(_)) => {
                                tracing::warn!(event_id = event.id, dispatcher_id = %self.id, "Claim expired before escalation, leaving event to its new claimant");
                                return Outcome::UpdateFailed;
                            }
                            Err(e) => {
                                tracing::error!(event_id = event.id, error = %e, "Failed to record exhausted retry count");
                            }
                        }
                        let record = NewDeadLetter::for_event(
                            &event,
                            next,
                            REASON_MAX_RETRIES,
                            Some(delivery_error.to_string()),
                        );
                        self.escalate(record).await
                    }
                }
            }
        }
    }

    async fn quarantine(&self, malformed: MalformedEvent) -> Outcome {
        tracing::warn!(
            event_id = malformed.row.id,
            defect = %malformed.defect,
            "Claimed malformed event",
        );
        self.escalate(NewDeadLetter::for_malformed(&malformed)).await
    }

    async fn escalate(&self, record: NewDeadLetter) -> Outcome {
        let reason = record.failure_reason.clone();
        match self.archiver.archive(record, self.id).await {
            Ok(()) => Outcome::DeadLettered { reason },
            Err(_) => Outcome::ArchiveFailed,
        }
    }

    async fn deliver(&self, address: &str) -> Result<(), DeliveryError> {
        let deadline = self.config.delivery_timeout;
        match tokio::time::timeout(deadline, self.notifier.send(address)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(deadline)),
        }
    }
}
