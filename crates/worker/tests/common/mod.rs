use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use onboard_core::RetryPolicy;
use onboard_db::models::Event;
use onboard_db::{EventStore, InMemoryEventStore};
use onboard_events::{DeliveryError, Notifier};
use onboard_worker::{Dispatcher, DispatcherConfig};

/// Notifier that replays a fixed script of results. Once the script runs
/// out every send succeeds.
#[derive(Default)]
pub struct ScriptedNotifier {
    script: Mutex<VecDeque<bool>>,
    delay: Option<Duration>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedNotifier {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        Self {
            script: Mutex::new(std::iter::repeat(false).take(times).collect()),
            ..Self::default()
        }
    }

    /// Every call sleeps for `delay` (tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Addresses of every attempt, successful or not.
    pub fn attempts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(&self, address: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(address.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if succeed {
            Ok(())
        } else {
            Err(DeliveryError::Rejected { status: 503 })
        }
    }
}

pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        poll_interval: Duration::from_secs(5),
        error_backoff: Duration::from_secs(5),
        delivery_timeout: Duration::from_secs(15),
        claim_lease: Duration::from_secs(300),
        stale_sweep_interval: Duration::from_secs(60),
    }
}

pub fn dispatcher(store: &Arc<InMemoryEventStore>, notifier: &Arc<ScriptedNotifier>) -> Dispatcher {
    Dispatcher::new(
        store.clone(),
        notifier.clone(),
        RetryPolicy::default(),
        test_config(),
    )
}

pub async fn registration(store: &InMemoryEventStore, email: &str) -> Event {
    store
        .create(
            "user_registration",
            &serde_json::json!({ "user_id": email, "email": email, "name": "Test" }),
        )
        .await
        .unwrap()
}
