//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use sm_post_core::repository::{EventRepository, ExpectedVersion, NewEvent, StoredEvent};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::schema;

/// PostgreSQL-backed event repository.
///
/// Appends run in one transaction that checks the last version, inserts the
/// events and their outbox entries. The unique `(aggregate_id, version)`
/// constraint turns a lost race between two writers into a concurrency
/// conflict.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn last_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(schema::SELECT_LAST_VERSION)
            .bind(aggregate_id)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }
}

fn infrastructure(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("event store database error: {e}"))
}

fn is_version_conflict(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                && db.constraint() == Some(schema::AGGREGATE_VERSION_CONSTRAINT)
    )
}

fn stored_event_from_row(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        version: row.try_get("version")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(schema::SELECT_EVENTS_BY_AGGREGATE)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.iter()
            .map(stored_event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(infrastructure)
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

        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        let actual = sqlx::query_scalar::<_, i64>(schema::SELECT_LAST_VERSION)
            .bind(aggregate_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(infrastructure)?;

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
            .zip(expected_version.next_version()..)
            .map(|(event, version)| event.into_stored(version))
            .collect();

        for event in &stored {
            let inserted = sqlx::query(schema::INSERT_EVENT)
                .bind(event.event_id)
                .bind(event.aggregate_id)
                .bind(&event.aggregate_type)
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(event.version)
                .bind(event.correlation_id)
                .bind(event.causation_id)
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await;

            if let Err(e) = inserted {
                if is_version_conflict(&e) {
                    // The aborted transaction is rolled back on drop.
                    drop(tx);
                    let actual = self.last_version(aggregate_id).await?;
                    return Err(DomainError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(infrastructure(e));
            }

            sqlx::query(schema::INSERT_OUTBOX)
                .bind(event.event_id)
                .execute(&mut *tx)
                .await
                .map_err(infrastructure)?;
        }

        tx.commit().await.map_err(infrastructure)?;

        debug!(
            aggregate_id = %aggregate_id,
            count = stored.len(),
            "appended events"
        );

        Ok(stored)
    }

    async fn unpublished_events(&self, limit: usize) -> Result<Vec<StoredEvent>, DomainError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(schema::SELECT_UNPUBLISHED)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.iter()
            .map(stored_event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(infrastructure)
    }

    async fn unpublished_events_for(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(schema::SELECT_UNPUBLISHED_BY_AGGREGATE)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.iter()
            .map(stored_event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(infrastructure)
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), DomainError> {
        sqlx::query(schema::DELETE_OUTBOX)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}
