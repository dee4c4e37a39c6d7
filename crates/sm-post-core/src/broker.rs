//! Message broker abstractions.
//!
//! The broker is an external collaborator: topic-based publish, and
//! consumer-group subscriptions with manual offset commit. Delivery is
//! at-least-once and ordered only within a partition, which is selected by
//! the message key.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainError;

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Partitioning key, if any.
    pub key: Option<String>,
    /// Raw message body.
    pub payload: Vec<u8>,
}

/// Publishes raw messages to a topic.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `payload` to `topic`, partitioned by `key`.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError>;
}

/// A consumer-group subscription with manual offset commit.
#[async_trait]
pub trait MessageSubscription: Send {
    /// Waits up to `timeout` for the next message. `Ok(None)` means the
    /// timeout elapsed, which is not an error.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>, DomainError>;

    /// Commits the consumer position past `message`. Uncommitted messages are
    /// redelivered after the subscription is recreated.
    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), DomainError>;
}
