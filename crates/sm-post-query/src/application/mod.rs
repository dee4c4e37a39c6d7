//! Application layer for the read side.

pub mod query_handlers;
