//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;
use crate::repository::ExpectedVersion;

/// An event-sourced consistency boundary. State is rebuilt by folding the
/// aggregate's own history through [`AggregateRoot::apply`]; commands record
/// new events as uncommitted until the store accepts them.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The stream identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Version of the last persisted event replayed into this instance.
    /// Zero means no history has been loaded.
    fn version(&self) -> i64;

    /// Folds one event into state. Must not perform I/O.
    fn apply(&mut self, event: &Self::Event);

    /// Events raised by commands and not yet persisted.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Drops uncommitted events once the store accepted them.
    fn clear_uncommitted_events(&mut self);

    /// The expectation to append uncommitted events with: the stream must
    /// still end at the version this instance was loaded at.
    fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::from_loaded(self.version())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::EventMetadata;

    #[derive(Debug)]
    struct Touched(EventMetadata);

    impl DomainEvent for Touched {
        fn event_type(&self) -> &'static str {
            "test.touched"
        }

        fn to_payload(&self) -> serde_json::Value {
            serde_json::json!({ "type": "test.touched" })
        }

        fn metadata(&self) -> &EventMetadata {
            &self.0
        }
    }

    struct Counter {
        id: Uuid,
        version: i64,
    }

    impl AggregateRoot for Counter {
        type Event = Touched;

        fn aggregate_id(&self) -> Uuid {
            self.id
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn apply(&mut self, _event: &Touched) {
            self.version += 1;
        }

        fn uncommitted_events(&self) -> &[Touched] {
            &[]
        }

        fn clear_uncommitted_events(&mut self) {}
    }

    #[test]
    fn test_unloaded_aggregate_expects_no_stream() {
        // Arrange
        let counter = Counter {
            id: Uuid::new_v4(),
            version: 0,
        };

        // Act
        let expected = counter.expected_version();

        // Assert
        assert_eq!(expected, ExpectedVersion::NoStream);
    }

    #[test]
    fn test_replayed_aggregate_expects_its_version() {
        // Arrange
        let id = Uuid::new_v4();
        let mut counter = Counter { id, version: 0 };
        let event = Touched(EventMetadata::new("test.touched", id, Uuid::new_v4(), Utc::now()));

        // Act
        counter.apply(&event);
        counter.apply(&event);

        // Assert
        assert_eq!(counter.expected_version(), ExpectedVersion::Exact(2));
    }
}
