//! Projection of published events into read entities.

pub mod consumer;
pub mod dead_letter;
pub mod event_handler;

pub use consumer::{ConsumerConfig, ConsumerState, ConsumerStats, EventConsumer};
pub use dead_letter::{BrokerDeadLetterSink, DeadLetter, DeadLetterSink, InMemoryDeadLetterQueue};
pub use event_handler::{PostProjector, ProjectionOutcome};
