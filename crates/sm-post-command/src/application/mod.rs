//! Application layer for the write side.

pub mod command_handlers;
