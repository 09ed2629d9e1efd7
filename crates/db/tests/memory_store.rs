use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use onboard_db::models::{ClaimedEvent, EventStatus, NewDeadLetter};
use onboard_db::{EventStore, InMemoryEventStore, StoreError};
use uuid::Uuid;

fn payload(email: &str) -> serde_json::Value {
    serde_json::json!({ "user_id": email, "email": email, "name": "Test" })
}

#[tokio::test]
async fn create_inserts_pending_event_with_zero_retries() {
    let store = InMemoryEventStore::new();
    let event = store
        .create("user_registration", &payload("a@example.com"))
        .await
        .unwrap();

    assert_eq!(event.retry_count, 0);
    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Pending.id());
    assert_eq!(event.created_at, event.updated_at);
}

#[tokio::test]
async fn claim_takes_oldest_pending_and_empties_the_queue() {
    let store = InMemoryEventStore::new();
    let first = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let second = store.create("user_registration", &payload("b@example.com")).await.unwrap();
    let worker = Uuid::new_v4();

    let claimed = store.claim_next_pending(worker).await.unwrap().unwrap();
    assert_eq!(claimed.id(), first.id);
    assert_matches!(claimed, ClaimedEvent::Ready(e) if e.claimed_by == Some(worker));
    let row = store.find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Processing.id());

    let claimed = store.claim_next_pending(worker).await.unwrap().unwrap();
    assert_eq!(claimed.id(), second.id);

    assert!(store.claim_next_pending(worker).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_claims_on_one_event_have_a_single_winner() {
    let store = Arc::new(InMemoryEventStore::new());
    store.create("user_registration", &payload("a@example.com")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.claim_next_pending(Uuid::new_v4()).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn mark_processed_is_idempotent_on_terminal_rows() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let worker = Uuid::new_v4();
    store.claim_next_pending(worker).await.unwrap();

    store.mark_processed(event.id, worker).await.unwrap();
    store.mark_processed(event.id, worker).await.unwrap();
    // A late retry must not resurrect a processed event.
    store.mark_retried(event.id, worker, 3).await.unwrap();

    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Processed.id());
    assert_eq!(row.retry_count, Some(0));
}

#[tokio::test]
async fn mark_retried_never_lowers_the_counter() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let worker = Uuid::new_v4();

    store.claim_next_pending(worker).await.unwrap();
    store.mark_retried(event.id, worker, 4).await.unwrap();
    store.claim_next_pending(worker).await.unwrap();
    store.mark_retried(event.id, worker, 2).await.unwrap();

    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.retry_count, Some(4));
    assert_eq!(row.status_id, EventStatus::Pending.id());
    assert_eq!(row.claimed_by, None);
}

#[tokio::test]
async fn mark_exhausted_keeps_the_claim() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let worker = Uuid::new_v4();
    store.claim_next_pending(worker).await.unwrap();

    store.mark_exhausted(event.id, worker, 6).await.unwrap();

    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Processing.id());
    assert_eq!(row.claimed_by, Some(worker));
    assert_eq!(row.retry_count, Some(6));
}

#[tokio::test]
async fn updates_on_unknown_ids_report_not_found() {
    let store = InMemoryEventStore::new();
    let worker = Uuid::new_v4();
    assert_matches!(store.mark_processed(99, worker).await, Err(StoreError::NotFound(99)));
    assert_matches!(store.mark_retried(99, worker, 1).await, Err(StoreError::NotFound(99)));
}

#[tokio::test]
async fn expired_claimant_cannot_settle_a_reclaimed_event() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    store.claim_next_pending(first).await.unwrap();
    store.requeue_stale(Utc::now() + Duration::seconds(1)).await.unwrap();
    store.claim_next_pending(second).await.unwrap();

    assert_matches!(
        store.mark_processed(event.id, first).await,
        Err(StoreError::ClaimLost(id)) if id == event.id
    );
    assert_matches!(store.mark_retried(event.id, first, 1).await, Err(StoreError::ClaimLost(_)));
    assert_matches!(store.mark_exhausted(event.id, first, 6).await, Err(StoreError::ClaimLost(_)));
    assert_matches!(store.mark_dead_lettered(event.id, first).await, Err(StoreError::ClaimLost(_)));

    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Processing.id());
    assert_eq!(row.claimed_by, Some(second));
    assert_eq!(row.retry_count, Some(0));

    store.mark_processed(event.id, second).await.unwrap();
    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Processed.id());
}

#[tokio::test]
async fn pending_event_cannot_be_settled_without_a_claim() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();

    assert_matches!(
        store.mark_processed(event.id, Uuid::new_v4()).await,
        Err(StoreError::ClaimLost(_))
    );
    assert_eq!(store.mutation_count(), 1);
}

#[tokio::test]
async fn requeue_stale_releases_only_old_claims() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    store.claim_next_pending(Uuid::new_v4()).await.unwrap();

    let released = store.requeue_stale(Utc::now() - Duration::hours(1)).await.unwrap();
    assert_eq!(released, 0);

    let released = store.requeue_stale(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(released, 1);

    let row = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, EventStatus::Pending.id());
    assert_eq!(row.claimed_by, None);
}

#[tokio::test]
async fn dead_letter_insert_is_idempotent_per_event() {
    let store = InMemoryEventStore::new();
    let event = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    let record = NewDeadLetter::for_event(&event, 6, "delivery failed after max retries", None);

    store.insert_dead_letter(&record).await.unwrap();
    store.insert_dead_letter(&record).await.unwrap();

    let dead = store.list_dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event_id, event.id);
    assert_eq!(dead[0].retry_count, Some(6));
}

#[tokio::test]
async fn unavailable_store_fails_every_operation() {
    let store = InMemoryEventStore::new();
    store.set_unavailable(true);

    assert_matches!(
        store.create("user_registration", &payload("a@example.com")).await,
        Err(StoreError::Unavailable(_))
    );
    assert_matches!(
        store.claim_next_pending(Uuid::new_v4()).await,
        Err(e) if e.is_transient()
    );

    store.set_unavailable(false);
    assert!(store.claim_next_pending(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn status_counts_cover_both_sinks() {
    let store = InMemoryEventStore::new();
    let a = store.create("user_registration", &payload("a@example.com")).await.unwrap();
    store.create("user_registration", &payload("b@example.com")).await.unwrap();
    let worker = Uuid::new_v4();
    store.claim_next_pending(worker).await.unwrap();
    store
        .insert_dead_letter(&NewDeadLetter::for_event(&a, 6, "delivery failed after max retries", None))
        .await
        .unwrap();
    store.mark_dead_lettered(a.id, worker).await.unwrap();

    let counts = store.status_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.dead_lettered, 1);
    assert_eq!(counts.dead_letter_sink, 1);
}
