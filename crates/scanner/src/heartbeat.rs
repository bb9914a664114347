#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::driver::Scanner;
use crate::error::Error;
use crate::hash::last_file_touch;
use crate::restart::Restarter;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Watches a heartbeat file's mtime. Once the heartbeat falls further
/// behind than the threshold the server is restarted, and keeps being
/// restarted every tick until the heartbeat resumes. An absent file
/// counts as stale.
pub struct HeartbeatScanner {
    name: String,
    heartbeat_file: PathBuf,
    threshold: Duration,
    restarter: Restarter,
    clock: Arc<dyn Clock>,
}

impl HeartbeatScanner {
    pub fn new(
        name: impl Into<String>,
        heartbeat_file: impl Into<PathBuf>,
        threshold: Duration,
        restarter: Restarter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            heartbeat_file: heartbeat_file.into(),
            threshold,
            restarter,
            clock,
        }
    }

    fn is_stale(&self) -> bool {
        let touch = last_file_touch(&self.heartbeat_file);
        if touch == 0 {
            return true;
        }
        self.clock.unix_now().saturating_sub(touch) > self.threshold.as_secs()
    }
}

#[async_trait]
impl Scanner for HeartbeatScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<(), Error> {
        if !self.is_stale() {
            trace!(scanner = self.name, "heartbeat fresh");
            return Ok(());
        }
        warn!(
            scanner = self.name,
            file = %self.heartbeat_file.display(),
            threshold = ?self.threshold,
            "heartbeat stale, restarting"
        );
        self.restarter.restart().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::SystemTime;
    use tempfile::tempdir;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn scanner_at(file: PathBuf, now_unix: i64) -> HeartbeatScanner {
        let clock = Arc::new(FixedClock(Utc.timestamp_opt(now_unix, 0).unwrap()));
        let restarter = Restarter::new(
            crate::restart::RestartTable::default(),
            Arc::new(crate::restart::ShellRunner),
        );
        HeartbeatScanner::new("heartbeat", file, Duration::from_secs(60), restarter, clock)
    }

    #[test]
    fn missing_heartbeat_is_stale() {
        let dir = tempdir().unwrap();
        let scanner = scanner_at(dir.path().join("heartbeat"), 1_700_000_000);
        assert!(scanner.is_stale());
    }

    #[test]
    fn fresh_and_stale_heartbeats() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("heartbeat");
        std::fs::write(&file, b"").unwrap();
        let beat = 1_700_000_000u64;
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(beat))
            .unwrap();

        // 30s behind: fresh. 61s behind: stale.
        assert!(!scanner_at(file.clone(), (beat + 30) as i64).is_stale());
        assert!(scanner_at(file, (beat + 61) as i64).is_stale());
    }
}
