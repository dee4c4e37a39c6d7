//! Dead letters: messages the projector gave up on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sm_post_core::broker::{BrokerMessage, MessagePublisher};
use sm_post_core::error::DomainError;
use sm_post_core::repository::StoredEvent;
use uuid::Uuid;

/// A message set aside for inspection, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset of the message.
    pub offset: i64,
    /// Message key.
    pub key: Option<String>,
    /// Event type, when the envelope could be decoded.
    pub event_type: Option<String>,
    /// Aggregate id, when the envelope could be decoded.
    pub aggregate_id: Option<Uuid>,
    /// Event version, when the envelope could be decoded.
    pub version: Option<i64>,
    /// Last error.
    pub error: String,
    /// Number of projection attempts.
    pub attempts: u32,
    /// Raw message body.
    pub payload: String,
    /// When the message was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Builds a dead letter for `message`.
    pub fn new(
        message: &BrokerMessage,
        envelope: Option<&StoredEvent>,
        error: &DomainError,
        attempts: u32,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            event_type: envelope.map(|e| e.event_type.clone()),
            aggregate_id: envelope.map(|e| e.aggregate_id),
            version: envelope.map(|e| e.version),
            error: error.to_string(),
            attempts,
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            failed_at,
        }
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Stores the dead letter durably.
    async fn send(&self, letter: &DeadLetter) -> Result<(), DomainError>;
}

/// Keeps dead letters in memory.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterQueue {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every dead letter received so far.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterQueue {
    async fn send(&self, letter: &DeadLetter) -> Result<(), DomainError> {
        self.letters
            .lock()
            .map_err(|_| DomainError::Infrastructure("dead letter queue lock poisoned".into()))?
            .push(letter.clone());
        Ok(())
    }
}

/// Publishes dead letters as JSON to `<source topic>.dead-letter`.
pub struct BrokerDeadLetterSink {
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
}

impl BrokerDeadLetterSink {
    /// Creates a sink for messages read from `source_topic`.
    pub fn new(publisher: Arc<dyn MessagePublisher>, source_topic: &str) -> Self {
        Self {
            publisher,
            topic: format!("{source_topic}.dead-letter"),
        }
    }

    /// The dead letter topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterSink for BrokerDeadLetterSink {
    async fn send(&self, letter: &DeadLetter) -> Result<(), DomainError> {
        let body = serde_json::to_vec(letter)
            .map_err(|e| DomainError::Serialization(format!("dead letter encoding failed: {e}")))?;
        let key = letter
            .aggregate_id
            .map_or_else(|| "unknown".to_owned(), |id| id.to_string());
        self.publisher.publish(&self.topic, &key, &body).await
    }
}
