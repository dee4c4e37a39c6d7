//! Social media post service: write side.
//!
//! Commands are validated by the post aggregate, which is rebuilt from its
//! event history on every command and never stored directly.

pub mod application;
pub mod domain;
