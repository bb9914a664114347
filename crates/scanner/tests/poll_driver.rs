#![forbid(unsafe_code)]

use async_trait::async_trait;
use scanner::{Error, PollDriver, Scanner};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct FlakyScanner {
    polls: Arc<AtomicUsize>,
}

#[async_trait]
impl Scanner for FlakyScanner {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn poll(&mut self) -> Result<(), Error> {
        let tick = self.polls.fetch_add(1, Ordering::SeqCst);
        if tick % 2 == 0 {
            // Per-tick failures must be swallowed by the driver.
            return Err(Error::UnsupportedOs("plan9".to_string()));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn driver_survives_tick_errors_and_stops_on_cancel() {
    let polls = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let driver = PollDriver::new(Duration::from_secs(1), cancel.clone());
    let scanner = Box::new(FlakyScanner {
        polls: polls.clone(),
    });

    let handle = tokio::spawn(driver.run(scanner));
    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();
    handle.await.unwrap();

    let seen = polls.load(Ordering::SeqCst);
    // Roughly one poll per second; errors on even ticks never killed the loop.
    assert!(seen >= 5, "expected several polls, got {seen}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_first_tick_exits_cleanly() {
    let polls = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let driver = PollDriver::new(Duration::from_secs(3600), cancel.clone());
    let scanner = Box::new(FlakyScanner {
        polls: polls.clone(),
    });

    cancel.cancel();
    tokio::spawn(driver.run(scanner)).await.unwrap();
}
