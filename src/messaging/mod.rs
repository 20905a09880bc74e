pub mod kafka;

pub use kafka::{EventPublisher, KafkaPublisher};
