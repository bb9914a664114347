#![forbid(unsafe_code)]

use crate::error::Error;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One poll tick of a long-running scanner. Implementations keep whatever
/// state they need between ticks; the driver owns the sleeping and the
/// error policy.
#[async_trait]
pub trait Scanner: Send {
    fn name(&self) -> &str;

    /// Evaluate one tick. Errors are per-cycle: the driver logs them and
    /// keeps polling.
    async fn poll(&mut self) -> Result<(), Error>;
}

impl std::fmt::Debug for dyn Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").field("name", &self.name()).finish()
    }
}

/// Generic polling loop: tick every `interval`, run the scanner, swallow
/// per-tick errors, exit on cancellation. One driver task per scanner.
pub struct PollDriver {
    interval: Duration,
    cancel: CancellationToken,
}

impl PollDriver {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self { interval, cancel }
    }

    pub async fn run(self, mut scanner: Box<dyn Scanner>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(scanner = scanner.name(), interval = ?self.interval, "scanner started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(scanner = scanner.name(), "scanner stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // A tick in flight is dropped on cancellation rather than
            // awaited to completion, so shutdown never waits on a slow
            // filesystem or a hung restart command.
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(scanner = scanner.name(), "scanner stopped");
                    return;
                }
                result = scanner.poll() => {
                    if let Err(err) = result {
                        warn!(scanner = scanner.name(), %err, "poll tick failed");
                    }
                }
            }
        }
    }
}
