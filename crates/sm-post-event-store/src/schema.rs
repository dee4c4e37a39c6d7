//! Event store SQL. Tables are created by the workspace migrations.

/// Name of the constraint that makes `(aggregate_id, version)` unique.
pub const AGGREGATE_VERSION_CONSTRAINT: &str = "uq_event_store_aggregate_version";

/// Loads an aggregate stream in version order.
pub const SELECT_EVENTS_BY_AGGREGATE: &str = r"
SELECT event_id, aggregate_id, aggregate_type, event_type, payload, version,
       correlation_id, causation_id, occurred_at
FROM event_store
WHERE aggregate_id = $1
ORDER BY version ASC
";

/// Last persisted version of a stream, zero when the stream is empty.
pub const SELECT_LAST_VERSION: &str = r"
SELECT COALESCE(MAX(version), 0)
FROM event_store
WHERE aggregate_id = $1
";

/// Inserts one event.
pub const INSERT_EVENT: &str = r"
INSERT INTO event_store (
    event_id, aggregate_id, aggregate_type, event_type, payload, version,
    correlation_id, causation_id, occurred_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
";

/// Records an event as awaiting publication.
pub const INSERT_OUTBOX: &str = r"
INSERT INTO event_outbox (event_id) VALUES ($1)
";

/// Oldest events still awaiting publication.
pub const SELECT_UNPUBLISHED: &str = r"
SELECT e.event_id, e.aggregate_id, e.aggregate_type, e.event_type, e.payload, e.version,
       e.correlation_id, e.causation_id, e.occurred_at
FROM event_outbox o
JOIN event_store e ON e.event_id = o.event_id
ORDER BY o.enqueued_at ASC, e.aggregate_id ASC, e.version ASC
LIMIT $1
";

/// Events of one aggregate still awaiting publication, in version order.
pub const SELECT_UNPUBLISHED_BY_AGGREGATE: &str = r"
SELECT e.event_id, e.aggregate_id, e.aggregate_type, e.event_type, e.payload, e.version,
       e.correlation_id, e.causation_id, e.occurred_at
FROM event_outbox o
JOIN event_store e ON e.event_id = o.event_id
WHERE e.aggregate_id = $1
ORDER BY e.version ASC
";

/// Confirms publication of an event.
pub const DELETE_OUTBOX: &str = r"
DELETE FROM event_outbox WHERE event_id = $1
";
