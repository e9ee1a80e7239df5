use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{debug, warn};

use chathub_core::models::{ChatMessage, ChatRecord};

use crate::error::{FanoutError, Result};

/// How long a publish may wait for broker acknowledgment before failing
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publish pipeline: turns validated client messages into log records.
///
/// Records are keyed by room id so the broker's per-partition ordering is
/// the per-room delivery ordering.
#[derive(Clone)]
pub struct MessagePublisher {
    producer: FutureProducer,
    topic: String,
}

impl MessagePublisher {
    /// Create a publisher requiring acknowledgment from all in-sync replicas.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }

    /// Append a `message_created` record to the log.
    ///
    /// Failure is surfaced to the caller (the client may retry the send) but
    /// never tears down the originating connection.
    pub async fn publish(&self, message: &ChatMessage) -> Result<()> {
        let record = ChatRecord::created(message);
        let payload = serde_json::to_vec(&record)?;
        let key = record.room_id.as_str();

        let delivery = self
            .producer
            .send(
                FutureRecord::to(&self.topic).key(key).payload(&payload),
                PUBLISH_TIMEOUT,
            )
            .await;

        match delivery {
            Ok(_) => {
                debug!(
                    message_id = %record.message_id,
                    room_id = %record.room_id,
                    "Message published to log"
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!(
                    message_id = %record.message_id,
                    room_id = %record.room_id,
                    error = %err,
                    "Failed to publish message to log"
                );
                Err(FanoutError::Kafka(err))
            }
        }
    }
}
