pub mod consumer;
pub mod producer;

pub use consumer::{instance_group_id, FanoutConsumer};
pub use producer::MessagePublisher;
