//! Domain layer for the read side.

pub mod entities;
pub mod queries;
pub mod repositories;
