#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::driver::Scanner;
use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

/// A configured cron job: schedule plus the script invocation. One
/// independent execution is spawned per due tick and never awaited by the
/// scanner loop; overlapping runs of the same job are allowed.
#[derive(Debug, Clone)]
pub struct CronJob {
    schedule: Schedule,
    script: PathBuf,
    workdir: PathBuf,
}

impl CronJob {
    pub fn new(
        expression: &str,
        script: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let schedule = Schedule::from_str(expression).map_err(|source| Error::CronExpression {
            expression: expression.to_string(),
            source,
        })?;
        Ok(Self {
            schedule,
            script: script.into(),
            workdir: workdir.into(),
        })
    }

    /// Build from configuration. The working directory defaults to the
    /// directory holding the cron configuration.
    pub fn from_spec(spec: &config::CronJobSpec, default_workdir: &Path) -> Result<Self, Error> {
        let workdir = spec
            .workdir
            .clone()
            .unwrap_or_else(|| default_workdir.to_path_buf());
        Self::new(&spec.schedule, spec.script.clone(), workdir)
    }

    /// Whether the schedule fires in the window `(after, now]`.
    fn due(&self, after: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.schedule
            .after(&after)
            .next()
            .is_some_and(|fire| fire <= now)
    }

    /// Run the script in the configured working directory, capturing
    /// combined stdout/stderr. The spawned process gets its own working
    /// directory, so the caller's is never disturbed.
    pub async fn execute(&self) -> Result<(), Error> {
        self.check_executable()?;
        let output = tokio::process::Command::new(&self.script)
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::ScriptFailed {
                script: self.script.clone(),
                status: output.status.code().unwrap_or(-1),
                output: combined,
            });
        }
        Ok(())
    }

    #[cfg(unix)]
    fn check_executable(&self) -> Result<(), Error> {
        use std::os::unix::fs::PermissionsExt;
        let meta = std::fs::metadata(&self.script)
            .map_err(|_| Error::ScriptNotExecutable(self.script.clone()))?;
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
            return Err(Error::ScriptNotExecutable(self.script.clone()));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_executable(&self) -> Result<(), Error> {
        if !self.script.is_file() {
            return Err(Error::ScriptNotExecutable(self.script.clone()));
        }
        Ok(())
    }
}

/// Evaluates every configured job's cron expression each tick and spawns
/// one fire-and-forget execution per due job. Job failures are logged
/// inside the spawned task and never reach the scanner loop.
pub struct CronScanner {
    name: String,
    jobs: Vec<CronJob>,
    clock: Arc<dyn Clock>,
    last_tick: DateTime<Utc>,
}

impl CronScanner {
    pub fn new(name: impl Into<String>, jobs: Vec<CronJob>, clock: Arc<dyn Clock>) -> Self {
        let last_tick = clock.now();
        Self {
            name: name.into(),
            jobs,
            clock,
            last_tick,
        }
    }

    /// Jobs due in the window since the previous tick. Split out of
    /// [`Scanner::poll`] so the window logic is testable without spawning.
    fn due_jobs(&mut self, now: DateTime<Utc>) -> Vec<CronJob> {
        let due = self
            .jobs
            .iter()
            .filter(|job| job.due(self.last_tick, now))
            .cloned()
            .collect();
        self.last_tick = now;
        due
    }
}

#[async_trait]
impl Scanner for CronScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        for job in self.due_jobs(now) {
            debug!(scanner = self.name, script = %job.script.display(), "spawning cron job");
            tokio::spawn(async move {
                if let Err(err) = job.execute().await {
                    error!(script = %job.script.display(), %err, "cron job failed");
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn every_minute_job_is_due_once_per_window() {
        let dir = tempdir().unwrap();
        let job = CronJob::new("0 * * * * *", dir.path().join("job.sh"), dir.path()).unwrap();
        let clock = Arc::new(FixedClock(at(10, 0, 30)));
        let mut scanner = CronScanner::new("cron", vec![job], clock);

        // Window crosses 10:01:00 -> due.
        assert_eq!(scanner.due_jobs(at(10, 1, 30)).len(), 1);
        // Next window (10:01:30, 10:01:50] crosses no minute boundary.
        assert_eq!(scanner.due_jobs(at(10, 1, 50)).len(), 0);
        // Crossing 10:02:00 makes it due again.
        assert_eq!(scanner.due_jobs(at(10, 2, 10)).len(), 1);
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = CronJob::new("not a cron line", "/bin/true", "/").unwrap_err();
        assert!(matches!(err, Error::CronExpression { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_executable_script_fails() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        // No exec bit.
        let job = CronJob::new("0 * * * * *", &script, dir.path()).unwrap();
        let err = job.execute().await.unwrap_err();
        assert!(matches!(err, Error::ScriptNotExecutable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_captures_output() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "#!/bin/sh\necho out\necho err >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let job = CronJob::new("0 * * * * *", &script, dir.path()).unwrap();
        match job.execute().await.unwrap_err() {
            Error::ScriptFailed { status, output, .. } => {
                assert_eq!(status, 3);
                assert!(output.contains("out"));
                assert!(output.contains("err"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_runs_in_its_working_directory() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let workdir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "#!/bin/sh\npwd > where.txt\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let job = CronJob::new("0 * * * * *", &script, workdir.path()).unwrap();
        job.execute().await.unwrap();

        let recorded = std::fs::read_to_string(workdir.path().join("where.txt")).unwrap();
        let recorded = Path::new(recorded.trim());
        assert_eq!(
            recorded.canonicalize().unwrap(),
            workdir.path().canonicalize().unwrap()
        );
    }
}
