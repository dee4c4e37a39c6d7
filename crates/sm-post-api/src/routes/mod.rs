//! Route modules: post commands, post lookups and health.

pub mod health;
pub mod post_lookup;
pub mod posts;
