//! Time source for event timestamps.
//!
//! Aggregates stamp `occurred_at`, `date_posted` and comment dates from an
//! injected clock, never from the system time directly, so command handling
//! stays reproducible under test.

use chrono::{DateTime, Utc};

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    /// The current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used by the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
