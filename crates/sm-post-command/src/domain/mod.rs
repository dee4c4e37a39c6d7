//! Domain layer for the write side.

pub mod aggregates;
pub mod commands;
