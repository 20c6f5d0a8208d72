pub mod processor;
pub mod publisher;

pub use processor::{BatchStats, OutboxProcessor};
pub use publisher::{EventPublisher, KafkaPublisher, LoggingPublisher};
