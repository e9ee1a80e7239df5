pub mod id;
pub mod message;

pub use id::{generate_id, RoomId, UserId};
pub use message::{ChatMessage, ChatRecord, EVENT_MESSAGE_CREATED, EVENT_MESSAGE_UPDATED};
