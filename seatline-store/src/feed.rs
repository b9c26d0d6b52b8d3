use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::Offset;
use seatline_core::{Delivery, MessageHandler};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::app_config::KafkaConfig;

/// At-least-once reader of the upstream event-definition topic.
///
/// Offsets are committed by hand: only after the handler acknowledges or
/// permanently rejects a message. A requeued message is re-read by seeking
/// the partition back to its offset.
pub struct KafkaEventFeed {
    consumer: StreamConsumer,
    topic: String,
    retry_backoff: Duration,
}

impl KafkaEventFeed {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub async fn run<H: MessageHandler>(&self, handler: &H) {
        info!(topic = %self.topic, "Event feed started, listening for event definitions...");

        loop {
            let message = match self.consumer.recv().await {
                Ok(m) => m,
                Err(e) => {
                    error!("Kafka error: {}", e);
                    continue;
                }
            };

            let partition = message.partition();
            let offset = message.offset();

            let outcome = match message.payload() {
                Some(payload) => handler.handle(payload).await,
                None => {
                    warn!(partition, offset, "Message has no payload, rejecting");
                    Delivery::Reject
                }
            };

            match offset_action(outcome) {
                OffsetAction::Commit => {
                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                        // Redelivery is harmless, the upsert is idempotent.
                        warn!(partition, offset, error = %e, "Failed to commit offset");
                    }
                }
                OffsetAction::Rewind => {
                    drop(message);
                    debug!(partition, offset, "Requeueing message");
                    // Zero timeout: librdkafka performs the seek asynchronously.
                    if let Err(e) = self.consumer.seek(
                        &self.topic,
                        partition,
                        Offset::Offset(offset),
                        Duration::ZERO,
                    ) {
                        error!(partition, offset, error = %e, "Failed to rewind partition for redelivery");
                    }
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }
    }
}

/// What the feed does with a message's offset once the handler has decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OffsetAction {
    /// Commit so the message is never read again.
    Commit,
    /// Leave uncommitted and seek back so the message is read again.
    Rewind,
}

pub(crate) fn offset_action(outcome: Delivery) -> OffsetAction {
    match outcome {
        Delivery::Ack | Delivery::Reject => OffsetAction::Commit,
        Delivery::Requeue => OffsetAction::Rewind,
    }
}
