//! The event store: append with optimistic concurrency, then publish.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use sm_post_core::broker::MessagePublisher;
use sm_post_core::error::DomainError;
use sm_post_core::repository::{EventRepository, ExpectedVersion, NewEvent, StoredEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

type AggregateLock = Arc<tokio::sync::Mutex<()>>;

/// Persists events per aggregate and hands them to the broker.
///
/// Appends to one aggregate are serialized in-process, and publication
/// happens while that serialization is held so that in-process publish order
/// matches version order. The repository's compare-and-append remains the
/// guarantee across processes.
pub struct EventStore {
    repository: Arc<dyn EventRepository>,
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
    locks: Mutex<HashMap<Uuid, AggregateLock>>,
}

impl EventStore {
    /// Creates an event store publishing to `topic`.
    pub fn new(
        repository: Arc<dyn EventRepository>,
        publisher: Arc<dyn MessagePublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            publisher,
            topic: topic.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The topic events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Loads the full history of an aggregate in version order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the aggregate has no
    /// events, or the repository's error.
    pub async fn load(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let events = self.repository.load_events(aggregate_id).await?;
        if events.is_empty() {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        Ok(events)
    }

    /// Appends `events` iff the stream is at `expected_version`, then
    /// publishes each persisted event keyed by the aggregate id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream moved, in
    /// which case nothing was persisted. Returns `DomainError::Publication`
    /// if the events were persisted but not all were published; they remain
    /// in the outbox for [`EventStore::republish_pending`].
    pub async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let lock = self.lock_for(aggregate_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.append_and_publish(aggregate_id, expected_version, events)
                .await
        };
        self.release(aggregate_id, &lock);
        result
    }

    /// Publishes the pending events of every aggregate that owns one of the
    /// `limit` oldest outbox entries. Returns how many were published.
    ///
    /// Each aggregate's pending events are re-read under its append lock, so
    /// an event a concurrent `append` already published is not sent twice.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publication` on the first event the broker
    /// rejects; later events are left for the next pass.
    pub async fn republish_pending(&self, limit: usize) -> Result<usize, DomainError> {
        let pending = self.repository.unpublished_events(limit).await?;
        let mut aggregates: Vec<Uuid> = Vec::new();
        for event in &pending {
            if !aggregates.contains(&event.aggregate_id) {
                aggregates.push(event.aggregate_id);
            }
        }

        let mut published = 0;
        for aggregate_id in aggregates {
            let lock = self.lock_for(aggregate_id)?;
            let result = {
                let _guard = lock.lock().await;
                self.publish_pending_for(aggregate_id, None).await
            };
            self.release(aggregate_id, &lock);
            published += result?;
        }

        if published > 0 {
            info!(published, "republished pending events");
        }

        Ok(published)
    }

    async fn append_and_publish(
        &self,
        aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let stored = self
            .repository
            .append_events(aggregate_id, expected_version, events)
            .await?;

        debug!(
            aggregate_id = %aggregate_id,
            expected_version = %expected_version,
            count = stored.len(),
            "events persisted"
        );

        // Earlier events stuck in the outbox go out first, or the partition
        // would carry this batch ahead of them.
        let first_new = expected_version.next_version();
        let earlier = self
            .publish_pending_for(aggregate_id, Some(first_new))
            .await
            .map_err(|e| match e {
                DomainError::Publication { .. } => e,
                other => DomainError::Publication {
                    aggregate_id,
                    version: first_new,
                    reason: other.to_string(),
                },
            })?;
        if earlier > 0 {
            info!(
                aggregate_id = %aggregate_id,
                published = earlier,
                "published earlier pending events before the new batch"
            );
        }

        for event in &stored {
            self.publish_one(event).await?;
        }

        Ok(stored)
    }

    /// Publishes the aggregate's pending events in version order, stopping
    /// before `below` when given. The caller holds the aggregate's lock.
    async fn publish_pending_for(
        &self,
        aggregate_id: Uuid,
        below: Option<i64>,
    ) -> Result<usize, DomainError> {
        let pending = self.repository.unpublished_events_for(aggregate_id).await?;
        let mut published = 0;
        for event in pending
            .iter()
            .filter(|event| below.is_none_or(|limit| event.version < limit))
        {
            self.publish_one(event).await?;
            published += 1;
        }
        Ok(published)
    }

    async fn publish_one(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let publication_failed = |reason: String| DomainError::Publication {
            aggregate_id: event.aggregate_id,
            version: event.version,
            reason,
        };

        let payload = event
            .to_message()
            .map_err(|e| publication_failed(e.to_string()))?;

        self.publisher
            .publish(&self.topic, &event.aggregate_id.to_string(), &payload)
            .await
            .map_err(|e| {
                warn!(
                    aggregate_id = %event.aggregate_id,
                    version = event.version,
                    error = %e,
                    "event persisted but not published"
                );
                publication_failed(e.to_string())
            })?;

        if let Err(e) = self.repository.mark_published(event.event_id).await {
            warn!(
                event_id = %event.event_id,
                error = %e,
                "event published but outbox entry not cleared"
            );
        }

        Ok(())
    }

    fn lock_for(&self, aggregate_id: Uuid) -> Result<AggregateLock, DomainError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DomainError::Infrastructure("aggregate lock table poisoned".into()))?;
        Ok(Arc::clone(locks.entry(aggregate_id).or_default()))
    }

    fn release(&self, aggregate_id: Uuid, lock: &AggregateLock) {
        if let Ok(mut locks) = self.locks.lock() {
            // Only the table and the caller hold it: nobody is waiting.
            if Arc::strong_count(lock) == 2 {
                locks.remove(&aggregate_id);
            }
        }
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
