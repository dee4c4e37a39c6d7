//! Social media post service: read side.
//!
//! The projector consumes published post events and maintains denormalized
//! post views; queries read those views and never touch the event store.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod projection;
