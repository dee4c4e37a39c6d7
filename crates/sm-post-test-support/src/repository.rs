//! Mock `EventRepository` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use sm_post_core::repository::{EventRepository, ExpectedVersion, NewEvent, StoredEvent};
use uuid::Uuid;

/// One recorded `append_events` call: aggregate, expectation and events.
pub type AppendCall = (Uuid, ExpectedVersion, Vec<NewEvent>);

fn assign_versions(expected_version: ExpectedVersion, events: &[NewEvent]) -> Vec<StoredEvent> {
    events
        .iter()
        .cloned()
        .zip(expected_version.next_version()..)
        .map(|(event, version)| event.into_stored(version))
        .collect()
}

/// An event repository that returns the configured history from every
/// `load_events` call and records every `append_events` call. Appends always
/// succeed and receive versions following the caller's expectation.
#[derive(Debug)]
pub struct RecordingEventRepository {
    history: Vec<StoredEvent>,
    appended: Mutex<Vec<AppendCall>>,
    published: Mutex<Vec<Uuid>>,
}

impl RecordingEventRepository {
    /// Creates a repository whose `load_events` returns `history`.
    #[must_use]
    pub fn new(history: Vec<StoredEvent>) -> Self {
        Self {
            history,
            appended: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all recorded appends.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<AppendCall> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns the event ids confirmed through `mark_published`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_ids(&self) -> Vec<Uuid> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.history.clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(assign_versions(expected_version, events))
    }

    async fn unpublished_events(&self, _limit: usize) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(Vec::new())
    }

    async fn unpublished_events_for(
        &self,
        _aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(Vec::new())
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), DomainError> {
        self.published.lock().unwrap().push(event_id);
        Ok(())
    }
}

/// An event repository with no history that silently accepts appends.
/// Useful for "aggregate not found" scenarios and creation commands.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        expected_version: ExpectedVersion,
        events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(assign_versions(expected_version, events))
    }

    async fn unpublished_events(&self, _limit: usize) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn unpublished_events_for(
        &self,
        _aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn mark_published(&self, _event_id: Uuid) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: ExpectedVersion,
        _events: &[NewEvent],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn unpublished_events(&self, _limit: usize) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn unpublished_events_for(
        &self,
        _aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn mark_published(&self, _event_id: Uuid) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
