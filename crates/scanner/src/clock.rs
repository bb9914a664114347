#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};

/// Source of "now" for date-triggered logic (log rotation, cron evaluation,
/// heartbeat staleness). Injected so the scanners stay testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as unix seconds.
    fn unix_now(&self) -> u64 {
        self.now().timestamp().max(0) as u64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
