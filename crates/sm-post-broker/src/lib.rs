//! Social media post service: message broker adapters.
//!
//! `InMemoryBroker` is a partitioned, consumer-group aware broker for a single
//! process. The Kafka adapters are available with the `kafka` feature.

pub mod in_memory;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use in_memory::{InMemoryBroker, InMemorySubscription};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaPublisher, KafkaSubscription};
