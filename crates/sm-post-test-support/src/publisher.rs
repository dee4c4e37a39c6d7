//! Mock `MessagePublisher` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use sm_post_core::broker::MessagePublisher;
use sm_post_core::error::DomainError;
use sm_post_core::repository::StoredEvent;

/// A message handed to a [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Partitioning key.
    pub key: String,
    /// Raw message body.
    pub payload: Vec<u8>,
}

/// A publisher that records every message it is given.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl RecordingPublisher {
    /// Creates an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the published messages, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Decodes every published message as an event envelope.
    ///
    /// # Panics
    ///
    /// Panics if a message is not an envelope.
    pub fn published_events(&self) -> Vec<StoredEvent> {
        self.messages()
            .iter()
            .map(|m| StoredEvent::from_message(&m.payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        self.messages.lock().unwrap().push(PublishedMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// A publisher whose broker is always unavailable.
#[derive(Debug, Default)]
pub struct FailingPublisher;

#[async_trait]
impl MessagePublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _key: &str, _payload: &[u8]) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("broker unavailable".into()))
    }
}
