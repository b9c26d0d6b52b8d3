use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::{Backend, Delivery, Event, EventId, EventStore, MessageHandler, StoreError};
use serde::Deserialize;
use tracing::{error, info, warn};

/// Event definition as published upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub id: EventId,
    pub name: String,
    pub max_seats: i32,
    pub waitlist_limit: i32,
    #[serde(default)]
    pub price: f64,
    pub booking_start_at: DateTime<Utc>,
    pub booking_end_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EventMessage {
    pub fn into_event(self, received_at: DateTime<Utc>) -> Event {
        Event {
            id: self.id,
            name: self.name,
            max_seats: self.max_seats,
            waitlist_limit: self.waitlist_limit,
            price: self.price,
            booking_start_at: self.booking_start_at,
            booking_end_at: self.booking_end_at,
            created_at: self.created_at.unwrap_or(received_at),
            updated_at: self.updated_at.unwrap_or(received_at),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid event {id}: {reason}")]
    Invalid { id: EventId, reason: String },
    #[error("Failed to store event: {0}")]
    Storage(#[from] StoreError),
}

impl ReplicationError {
    /// Payload problems never heal on redelivery; storage problems might.
    pub fn delivery(&self) -> Delivery {
        match self {
            ReplicationError::Decode(_) | ReplicationError::Invalid { .. } => Delivery::Reject,
            ReplicationError::Storage(_) => Delivery::Requeue,
        }
    }
}

/// Keeps the local event table in step with the upstream feed.
///
/// Upserts are last-write-wins: a stale redelivery that arrives after a newer
/// definition overwrites it.
#[derive(Clone)]
pub struct EventReplicator<B: Backend> {
    backend: B,
}

impl<B: Backend> EventReplicator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> Result<Event, ReplicationError> {
        let message: EventMessage = serde_json::from_slice(payload)?;
        let event = message.into_event(received_at);
        event
            .validate()
            .map_err(|reason| ReplicationError::Invalid { id: event.id, reason })?;
        Ok(event)
    }

    pub async fn apply(&self, payload: &[u8]) -> Result<Event, ReplicationError> {
        let event = Self::decode(payload, Utc::now())?;
        self.backend.events().upsert(&event).await?;
        Ok(event)
    }
}

#[async_trait]
impl<B: Backend> MessageHandler for EventReplicator<B> {
    async fn handle(&self, payload: &[u8]) -> Delivery {
        match self.apply(payload).await {
            Ok(event) => {
                info!(event_id = event.id, name = %event.name, "Synced event");
                Delivery::Ack
            }
            Err(e) => {
                let delivery = e.delivery();
                match delivery {
                    Delivery::Requeue => error!(error = %e, "Event sync failed, requesting redelivery"),
                    _ => warn!(error = %e, "Rejecting event message"),
                }
                delivery
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_store::MemoryBackend;
    use serde_json::json;

    fn payload(id: EventId, name: &str, max_seats: i32) -> Vec<u8> {
        json!({
            "id": id,
            "name": name,
            "max_seats": max_seats,
            "waitlist_limit": 5,
            "price": 2500.0,
            "booking_start_at": "2026-01-01T09:00:00Z",
            "booking_end_at": "2026-01-31T18:00:00Z",
            "created_at": "2025-12-01T00:00:00Z",
            "updated_at": "2025-12-01T00:00:00Z"
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_later_upsert_wins() {
        let backend = MemoryBackend::new();
        let replicator = EventReplicator::new(backend.clone());

        assert_eq!(replicator.handle(&payload(1, "Golang Workshop", 50)).await, Delivery::Ack);
        assert_eq!(replicator.handle(&payload(1, "Rust Workshop", 60)).await, Delivery::Ack);

        let stored = backend.events().find(1).await.unwrap().unwrap();
        assert_eq!(stored.name, "Rust Workshop");
        assert_eq!(stored.max_seats, 60);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let backend = MemoryBackend::new();
        let replicator = EventReplicator::new(backend.clone());
        let message = payload(2, "Meetup", 10);

        assert_eq!(replicator.handle(&message).await, Delivery::Ack);
        let first = backend.events().find(2).await.unwrap().unwrap();
        assert_eq!(replicator.handle(&message).await, Delivery::Ack);
        let second = backend.events().find(2).await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let replicator = EventReplicator::new(MemoryBackend::new());

        assert_eq!(replicator.handle(b"not json").await, Delivery::Reject);
        assert_eq!(replicator.handle(br#"{"id": 1, "name": "x"}"#).await, Delivery::Reject);
        // Decodes, but the window is inverted.
        let inverted = json!({
            "id": 3,
            "name": "Backwards",
            "max_seats": 10,
            "waitlist_limit": 0,
            "booking_start_at": "2026-02-01T00:00:00Z",
            "booking_end_at": "2026-01-01T00:00:00Z"
        })
        .to_string();
        assert_eq!(replicator.handle(inverted.as_bytes()).await, Delivery::Reject);
    }

    #[tokio::test]
    async fn test_storage_failure_requeues() {
        let backend = MemoryBackend::new();
        let replicator = EventReplicator::new(backend.clone());

        backend.set_offline(true);
        assert_eq!(replicator.handle(&payload(4, "Retry", 10)).await, Delivery::Requeue);

        backend.set_offline(false);
        assert_eq!(replicator.handle(&payload(4, "Retry", 10)).await, Delivery::Ack);
        assert!(backend.events().find(4).await.unwrap().is_some());
    }

    #[test]
    fn test_missing_timestamps_default_to_receipt_time() {
        let received = Utc::now();
        let body = json!({
            "id": 9,
            "name": "No stamps",
            "max_seats": 1,
            "waitlist_limit": 0,
            "booking_start_at": "2026-01-01T00:00:00Z",
            "booking_end_at": "2026-01-02T00:00:00Z"
        })
        .to_string();

        let event = EventReplicator::<MemoryBackend>::decode(body.as_bytes(), received).unwrap();
        assert_eq!(event.created_at, received);
        assert_eq!(event.updated_at, received);
        assert_eq!(event.price, 0.0);
    }
}
