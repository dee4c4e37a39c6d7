//! Event repository abstraction.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Version the caller expects the aggregate stream to be at when appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The last persisted version must be exactly this value.
    Exact(i64),
}

impl ExpectedVersion {
    /// Raw sentinel used on the wire for [`ExpectedVersion::NoStream`].
    pub const NO_STREAM: i64 = -1;

    /// Expected version for an aggregate that was loaded at `version`.
    /// An aggregate with no history maps to [`ExpectedVersion::NoStream`].
    #[must_use]
    pub fn from_loaded(version: i64) -> Self {
        if version == 0 {
            Self::NoStream
        } else {
            Self::Exact(version)
        }
    }

    /// Returns `true` if a stream whose last persisted version is `actual`
    /// (zero for an empty stream) satisfies this expectation.
    #[must_use]
    pub fn matches(self, actual: i64) -> bool {
        match self {
            Self::NoStream => actual == 0,
            Self::Exact(expected) => actual == expected,
        }
    }

    /// The version the first appended event will receive.
    #[must_use]
    pub fn next_version(self) -> i64 {
        match self {
            Self::NoStream => 1,
            Self::Exact(version) => version + 1,
        }
    }

    /// Raw integer form; [`ExpectedVersion::NO_STREAM`] for a new stream.
    #[must_use]
    pub fn as_raw(self) -> i64 {
        match self {
            Self::NoStream => Self::NO_STREAM,
            Self::Exact(version) => version,
        }
    }
}

impl TryFrom<i64> for ExpectedVersion {
    type Error = DomainError;

    /// Accepts [`ExpectedVersion::NO_STREAM`] or a non-negative version.
    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            Self::NO_STREAM => Ok(Self::NoStream),
            version if version >= 0 => Ok(Self::Exact(version)),
            other => Err(DomainError::InvalidArgument(format!(
                "expected version {other} is neither {} nor a version",
                Self::NO_STREAM
            ))),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// An event submitted for persistence. It has no version yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    /// Builds the persistence record for a domain event.
    pub fn from_domain_event<E: DomainEvent>(aggregate_type: &str, event: &E) -> Self {
        let meta = event.metadata();
        Self {
            event_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            aggregate_type: aggregate_type.to_owned(),
            event_type: event.event_type().to_owned(),
            payload: event.to_payload(),
            correlation_id: meta.correlation_id,
            causation_id: meta.causation_id,
            occurred_at: meta.occurred_at,
        }
    }

    /// Attaches the version assigned by the store.
    #[must_use]
    pub fn into_stored(self, version: i64) -> StoredEvent {
        StoredEvent {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            payload: self.payload,
            version,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Stored representation of a domain event. This is also the envelope
/// published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version within the aggregate stream, starting at 1.
    pub version: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Encodes the envelope as JSON bytes for the broker.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if encoding fails.
    pub fn to_message(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self)
            .map_err(|e| DomainError::Serialization(format!("event envelope encoding failed: {e}")))
    }

    /// Decodes an envelope received from the broker.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the bytes are not an envelope.
    pub fn from_message(bytes: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| DomainError::Serialization(format!("event envelope decoding failed: {e}")))
    }
}

/// Repository trait for loading and appending domain events.
///
/// Implementations persist an outbox entry with every appended event in the
/// same atomic unit as the event itself, so that publication can be retried
/// after a crash.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by version. Returns an
    /// empty list when the aggregate has no history.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Atomically append new events to an aggregate stream iff its last
    /// persisted version satisfies `expected_version`. Versions are assigned
    /// sequentially starting after the current last version.
    ///
    /// Fails with `DomainError::ConcurrencyConflict` without persisting
    /// anything when the expectation does not hold.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Returns up to `limit` persisted events whose publication has not been
    /// confirmed, oldest first.
    async fn unpublished_events(&self, limit: usize) -> Result<Vec<StoredEvent>, DomainError>;

    /// Returns every event of one aggregate whose publication has not been
    /// confirmed, in version order.
    async fn unpublished_events_for(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Confirms that an event was handed to the broker.
    async fn mark_published(&self, event_id: Uuid) -> Result<(), DomainError>;
}
