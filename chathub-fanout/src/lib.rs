pub mod error;
pub mod hub;
pub mod kafka;

pub use error::{FanoutError, Result};
pub use hub::{RoomHub, OUTBOUND_QUEUE_CAPACITY};
pub use kafka::{instance_group_id, FanoutConsumer, MessagePublisher};
