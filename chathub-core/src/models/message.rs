use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{generate_id, RoomId, UserId};

/// Record event type for newly created messages.
pub const EVENT_MESSAGE_CREATED: &str = "message_created";

/// Record event type for message edits. Currently logged and dropped by the
/// fan-out consumer; reserved for future edit support.
pub const EVENT_MESSAGE_UPDATED: &str = "message_updated";

/// A chat message as delivered to connected clients.
///
/// Immutable once created; the session discards it after delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String, // nanoid(12)
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(room_id: RoomId, user_id: UserId, username: String, content: String) -> Self {
        Self {
            id: generate_id(),
            user_id,
            username,
            content,
            room_id,
            created_at: Utc::now(),
        }
    }
}

/// Wire representation of a message on the Kafka topic.
///
/// Flat structure shared with the persistence service, which consumes the
/// same topic independently. `room_id` doubles as the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub message_id: String,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub room_id: RoomId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
}

impl ChatRecord {
    /// Build a `message_created` record from a freshly authored message.
    pub fn created(message: &ChatMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            user_id: message.user_id.clone(),
            username: message.username.clone(),
            content: message.content.clone(),
            room_id: message.room_id.clone(),
            timestamp: message.created_at,
            event_type: EVENT_MESSAGE_CREATED.to_string(),
        }
    }

    /// Translate a record read from the log back into a deliverable message.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.message_id,
            user_id: self.user_id,
            username: self.username,
            content: self.content,
            room_id: self.room_id,
            created_at: self.timestamp,
        }
    }
}
