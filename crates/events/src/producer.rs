//! Registration producer.
//!
//! [`EventProducer`] is the only writer of new events. It validates a
//! [`RegisterUser`] request and durably records a `user_registration` event;
//! the dispatcher picks the event up from there.

use std::sync::Arc;

use onboard_core::event_types::USER_REGISTRATION;
use onboard_core::registration::RegisterUser;
use onboard_core::CoreError;
use onboard_db::models::Event;
use onboard_db::{EventStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Failed to record registration event: {0}")]
    Store(#[from] StoreError),
}

pub struct EventProducer {
    store: Arc<dyn EventStore>,
}

impl EventProducer {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Validate the registration and insert a pending `user_registration`
    /// event. The password is checked for presence and then dropped.
    pub async fn register_user(&self, request: RegisterUser) -> Result<Event, RegistrationError> {
        let payload = request.into_payload()?;

        let event = self
            .store
            .create(USER_REGISTRATION, &payload.to_json())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, email = %payload.email, "Failed to persist registration event");
                e
            })?;

        tracing::info!(event_id = event.id, user_id = %payload.user_id, "Registration event recorded");
        Ok(event)
    }
}
