//! Social media post service: event store.
//!
//! Appends events per aggregate with optimistic concurrency, records an
//! outbox entry with each event, and publishes persisted events to the
//! broker.

pub mod event_store;
pub mod in_memory;
pub mod outbox_relay;
pub mod pg_event_repository;
pub mod schema;

pub use event_store::EventStore;
pub use in_memory::InMemoryEventRepository;
pub use outbox_relay::{OutboxRelayHandle, spawn_outbox_relay};
pub use pg_event_repository::PgEventRepository;
