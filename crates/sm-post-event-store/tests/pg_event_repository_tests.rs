//! Integration tests for `PgEventRepository`.
//!
//! These need a running `PostgreSQL` reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use chrono::{TimeZone, Utc};
use sm_post_core::error::DomainError;
use sm_post_core::repository::{EventRepository, ExpectedVersion, NewEvent};
use sm_post_event_store::pg_event_repository::PgEventRepository;
use sqlx::PgPool;
use uuid::Uuid;

/// Helper to build a `NewEvent` with sensible defaults.
fn make_new_event(aggregate_id: Uuid) -> NewEvent {
    NewEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        aggregate_type: "post".to_string(),
        event_type: "post.liked".to_string(),
        payload: serde_json::json!({"type": "post.liked", "post_id": aggregate_id}),
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    }
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_load_events_returns_empty_vec_for_nonexistent_aggregate(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(Uuid::new_v4()).await.unwrap();

    assert!(events.is_empty());
}

// --- append_events + load_events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_append_and_load_single_event(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let event = make_new_event(aggregate_id);
    let expected = event.clone().into_stored(1);

    let stored = repo
        .append_events(aggregate_id, ExpectedVersion::NoStream, &[event])
        .await
        .unwrap();

    assert_eq!(stored, vec![expected.clone()]);
    let loaded = repo.load_events(aggregate_id).await.unwrap();
    assert_eq!(loaded, vec![expected]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_sequential_appends_assign_contiguous_versions(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        ExpectedVersion::NoStream,
        &[make_new_event(aggregate_id), make_new_event(aggregate_id)],
    )
    .await
    .unwrap();

    let stored = repo
        .append_events(
            aggregate_id,
            ExpectedVersion::Exact(2),
            &[make_new_event(aggregate_id), make_new_event(aggregate_id)],
        )
        .await
        .unwrap();

    assert_eq!(stored[0].version, 3);
    assert_eq!(stored[1].version, 4);
    let loaded = repo.load_events(aggregate_id).await.unwrap();
    let versions: Vec<i64> = loaded.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_aggregate_isolation(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let agg_a = Uuid::new_v4();
    let agg_b = Uuid::new_v4();

    repo.append_events(agg_a, ExpectedVersion::NoStream, &[make_new_event(agg_a)])
        .await
        .unwrap();
    repo.append_events(agg_b, ExpectedVersion::NoStream, &[make_new_event(agg_b)])
        .await
        .unwrap();

    let loaded_a = repo.load_events(agg_a).await.unwrap();
    let loaded_b = repo.load_events(agg_b).await.unwrap();
    assert_eq!(loaded_a.len(), 1);
    assert_eq!(loaded_b.len(), 1);
    assert_eq!(loaded_a[0].aggregate_id, agg_a);
    assert_eq!(loaded_b[0].aggregate_id, agg_b);
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_stale_expected_version_conflicts_and_persists_nothing(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        ExpectedVersion::NoStream,
        &[make_new_event(aggregate_id), make_new_event(aggregate_id)],
    )
    .await
    .unwrap();

    let result = repo
        .append_events(
            aggregate_id,
            ExpectedVersion::Exact(1),
            &[make_new_event(aggregate_id)],
        )
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: conflict_agg_id,
            expected,
            actual,
        }) => {
            assert_eq!(conflict_agg_id, aggregate_id);
            assert_eq!(expected, ExpectedVersion::Exact(1));
            assert_eq!(actual, 2);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_no_stream_conflicts_when_aggregate_exists(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        ExpectedVersion::NoStream,
        &[make_new_event(aggregate_id)],
    )
    .await
    .unwrap();

    let result = repo
        .append_events(
            aggregate_id,
            ExpectedVersion::NoStream,
            &[make_new_event(aggregate_id)],
        )
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { actual: 1, .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_concurrent_appends_admit_exactly_one_writer(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        ExpectedVersion::NoStream,
        &[make_new_event(aggregate_id)],
    )
    .await
    .unwrap();

    let first_events = [make_new_event(aggregate_id)];
    let second_events = [make_new_event(aggregate_id)];
    let (first, second) = tokio::join!(
        repo.append_events(aggregate_id, ExpectedVersion::Exact(1), &first_events),
        repo.append_events(aggregate_id, ExpectedVersion::Exact(1), &second_events),
    );

    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 2);
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_appended_events_stay_unpublished_until_marked(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let stored = repo
        .append_events(
            aggregate_id,
            ExpectedVersion::NoStream,
            &[make_new_event(aggregate_id), make_new_event(aggregate_id)],
        )
        .await
        .unwrap();

    repo.mark_published(stored[0].event_id).await.unwrap();

    let pending = repo.unpublished_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_id, stored[1].event_id);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_unpublished_events_for_filters_by_aggregate_in_version_order(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let other_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        ExpectedVersion::NoStream,
        &[make_new_event(aggregate_id), make_new_event(aggregate_id)],
    )
    .await
    .unwrap();
    repo.append_events(other_id, ExpectedVersion::NoStream, &[make_new_event(other_id)])
        .await
        .unwrap();

    let pending = repo.unpublished_events_for(aggregate_id).await.unwrap();

    let versions: Vec<i64> = pending.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert!(pending.iter().all(|e| e.aggregate_id == aggregate_id));
}

// --- edge cases ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_append_empty_events_is_noop(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    let stored = repo
        .append_events(aggregate_id, ExpectedVersion::Exact(4), &[])
        .await
        .unwrap();

    assert!(stored.is_empty());
    assert!(repo.load_events(aggregate_id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_timestamp_precision(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let mut event = make_new_event(aggregate_id);
    event.occurred_at = Utc::now();
    let original_timestamp = event.occurred_at;

    repo.append_events(aggregate_id, ExpectedVersion::NoStream, &[event])
        .await
        .unwrap();

    let loaded = repo.load_events(aggregate_id).await.unwrap();
    // PostgreSQL TIMESTAMPTZ has microsecond precision.
    assert_eq!(
        original_timestamp.timestamp_micros(),
        loaded[0].occurred_at.timestamp_micros()
    );
}
