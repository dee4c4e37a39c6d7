//! Social media post service: shared domain abstractions.
//!
//! This crate defines the traits and types that the write side, the read side
//! and the infrastructure crates depend on. It contains no infrastructure code.

pub mod aggregate;
pub mod broker;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod query;
pub mod repository;
