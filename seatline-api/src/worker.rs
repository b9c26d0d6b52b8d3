use rdkafka::error::KafkaError;
use seatline_booking::EventReplicator;
use seatline_core::Backend;
use seatline_store::app_config::KafkaConfig;
use seatline_store::KafkaEventFeed;
use tokio::task::JoinHandle;
use tracing::info;

/// Subscribes to the event-definition topic and replicates every message
/// into local storage on a background task.
pub fn start_replication_worker<B: Backend>(
    config: &KafkaConfig,
    backend: B,
) -> Result<JoinHandle<()>, KafkaError> {
    let feed = KafkaEventFeed::new(config)?;
    let replicator = EventReplicator::new(backend);

    info!(brokers = %config.brokers, topic = %config.topic, "Replication worker starting");
    Ok(tokio::spawn(async move {
        feed.run(&replicator).await;
    }))
}
