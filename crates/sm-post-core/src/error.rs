//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::repository::ExpectedVersion;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A command or query carried malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command is illegal in the aggregate's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The caller does not own the resource it tried to change.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A sub-entity referenced by a command does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: ExpectedVersion,
        /// The actual version found.
        actual: i64,
    },

    /// No handler is registered for the dispatched command or query kind.
    #[error("no handler registered for {0}")]
    HandlerNotFound(String),

    /// A handler is already registered for the command or query kind.
    #[error("a handler is already registered for {0}")]
    AlreadyRegistered(String),

    /// An event payload carried a discriminator this build does not know.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// A payload or envelope could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The read entity an event applies to has not been projected yet.
    #[error("projection pending: {0}")]
    ProjectionPending(String),

    /// Events were persisted but handing them to the broker failed.
    #[error("event {version} of aggregate {aggregate_id} was persisted but not published: {reason}")]
    Publication {
        /// The aggregate whose event was not published.
        aggregate_id: Uuid,
        /// Version of the first event that was not published.
        version: i64,
        /// Broker failure description.
        reason: String,
    },

    /// An infrastructure/persistence error. Retryable.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` when the failure was caused by the caller's input or by
    /// the state the caller observed, as opposed to an internal failure.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidState(_)
                | Self::PermissionDenied(_)
                | Self::NotFound(_)
                | Self::AggregateNotFound(_)
                | Self::ConcurrencyConflict { .. }
        )
    }

    /// Returns `true` when repeating the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::ProjectionPending(_))
    }
}
