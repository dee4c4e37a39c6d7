//! In-memory implementation of the `EventRepository` trait.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use sm_post_core::repository::{EventRepository, ExpectedVersion, NewEvent, StoredEvent};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Streams {
    by_aggregate: HashMap<Uuid, Vec<StoredEvent>>,
    outbox: Vec<StoredEvent>,
}

/// Process-local event repository. The version check and the append happen
/// under one lock, so concurrent writers observe compare-and-append.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<Streams>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Streams>, DomainError> {
        self.streams
            .lock()
            .map_err(|_| DomainError::Infrastructure("event stream lock poisoned".into()))
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .lock()?
            .by_aggregate
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut streams = self.lock()?;
        let actual = streams
            .by_aggregate
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(0, |last| last.version);

        if !expected_version.matches(actual) {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        let stored: Vec<StoredEvent> = events
            .iter()
            .cloned()
            .zip(actual + 1..)
            .map(|(event, version)| event.into_stored(version))
            .collect();

        streams
            .by_aggregate
            .entry(aggregate_id)
            .or_default()
            .extend(stored.iter().cloned());
        streams.outbox.extend(stored.iter().cloned());

        Ok(stored)
    }

    async fn unpublished_events(&self, limit: usize) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.lock()?.outbox.iter().take(limit).cloned().collect())
    }

    async fn unpublished_events_for(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let mut pending: Vec<StoredEvent> = self
            .lock()?
            .outbox
            .iter()
            .filter(|event| event.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        pending.sort_by_key(|event| event.version);
        Ok(pending)
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), DomainError> {
        self.lock()?.outbox.retain(|event| event.event_id != event_id);
        Ok(())
    }
}
