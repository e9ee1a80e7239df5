use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chathub_core::models::{ChatRecord, EVENT_MESSAGE_CREATED};

use crate::error::Result;
use crate::hub::RoomHub;

/// Derive a consumer group id unique to this process instance.
///
/// Fan-out is a broadcast-style read: every instance must see the full
/// stream, so instances must not share a consumer group (that would split
/// partitions between them).
#[must_use]
pub fn instance_group_id(prefix: &str) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{prefix}-{host}-{}", nanoid::nanoid!(6))
}

/// Fan-out consumer: one per process, tails the log and redistributes every
/// record to the locally held connections of the matching room.
pub struct FanoutConsumer {
    consumer: StreamConsumer,
    hub: Arc<RoomHub>,
}

impl FanoutConsumer {
    pub fn new(brokers: &str, topic: &str, group_id: &str, hub: Arc<RoomHub>) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()?;

        consumer.subscribe(&[topic])?;

        info!(topic, group_id, "Fan-out consumer subscribed");

        Ok(Self { consumer, hub })
    }

    /// Run until cancellation. Read errors are logged and the loop continues;
    /// no error in the fan-out path may halt delivery for other records.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Fan-out consumer stopping");
                    break;
                }
                result = self.consumer.recv() => match result {
                    Ok(record) => match record.payload() {
                        Some(payload) => dispatch_record(&self.hub, payload),
                        None => warn!("Skipping log record with empty payload"),
                    },
                    Err(err) => {
                        warn!(error = %err, "Failed to read from log, retrying");
                    }
                }
            }
        }
    }
}

/// Decode one log record and hand it to the hub.
///
/// Malformed payloads and unrecognized event types are logged and dropped;
/// the latter is a forward-compatible no-op, not an error.
fn dispatch_record(hub: &RoomHub, payload: &[u8]) {
    let record: ChatRecord = match serde_json::from_slice(payload) {
        Ok(record) => record,
        Err(err) => {
            warn!(error = %err, "Failed to decode log record");
            return;
        }
    };

    if record.event_type == EVENT_MESSAGE_CREATED {
        let room_id = record.room_id.clone();
        let message = record.into_message();
        hub.broadcast(&message, &room_id);
    } else {
        debug!(
            event_type = %record.event_type,
            message_id = %record.message_id,
            "Ignoring unhandled event type"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chathub_core::models::{ChatMessage, RoomId, UserId, EVENT_MESSAGE_UPDATED};

    fn record_bytes(room: &str, content: &str, event_type: &str) -> Vec<u8> {
        let message = ChatMessage::new(
            RoomId::from_string(room.to_string()),
            UserId::from_string("u1".to_string()),
            "alice".to_string(),
            content.to_string(),
        );
        let mut record = ChatRecord::created(&message);
        record.event_type = event_type.to_string();
        serde_json::to_vec(&record).expect("serialize record")
    }

    #[tokio::test]
    async fn test_created_record_broadcast_to_matching_room_only() {
        let hub = Arc::new(RoomHub::new());
        let r1 = RoomId::from_string("r1".to_string());
        let r2 = RoomId::from_string("r2".to_string());

        let mut rx1 = hub.register(
            r1.clone(),
            UserId::from_string("a".to_string()),
            "conn-a".to_string(),
        );
        let mut rx2 = hub.register(
            r2.clone(),
            UserId::from_string("c".to_string()),
            "conn-c".to_string(),
        );

        dispatch_record(&hub, &record_bytes("r1", "hi", EVENT_MESSAGE_CREATED));

        let delivered = rx1.recv().await.expect("room r1 receives");
        assert_eq!(delivered.content, "hi");
        assert_eq!(delivered.room_id, r1);

        // Room r2 never sees r1 traffic
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_dropped() {
        let hub = Arc::new(RoomHub::new());
        let r1 = RoomId::from_string("r1".to_string());
        let mut rx = hub.register(
            r1.clone(),
            UserId::from_string("a".to_string()),
            "conn-a".to_string(),
        );

        dispatch_record(&hub, &record_bytes("r1", "edited", EVENT_MESSAGE_UPDATED));
        dispatch_record(&hub, &record_bytes("r1", "???", "message_exploded"));

        assert!(rx.try_recv().is_err());
        // Registry untouched
        assert_eq!(hub.subscriber_count(&r1), 1);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_skipped() {
        let hub = Arc::new(RoomHub::new());
        let r1 = RoomId::from_string("r1".to_string());
        let mut rx = hub.register(
            r1.clone(),
            UserId::from_string("a".to_string()),
            "conn-a".to_string(),
        );

        dispatch_record(&hub, b"not json at all");
        dispatch_record(&hub, b"{\"partial\": true}");

        // Delivery continues afterwards
        dispatch_record(&hub, &record_bytes("r1", "still works", EVENT_MESSAGE_CREATED));
        assert_eq!(rx.recv().await.expect("delivered").content, "still works");
    }

    #[test]
    fn test_instance_group_id_is_unique_per_call() {
        let a = instance_group_id("chathub");
        let b = instance_group_id("chathub");
        assert!(a.starts_with("chathub-"));
        assert_ne!(a, b);
    }
}
