use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::PathBuf;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerSpec {
    /// Scanner variant to construct. Known kinds are `deployment`,
    /// `webapps`, `recursive-directory`, `cron`, `logrotate`, `heartbeat`
    /// and `supervisor-deployment`. Unknown kinds are rejected by the
    /// scanner factory, not here, so that the set of variants lives in one
    /// place.
    pub kind: String,

    /// Name used in logs to identify this scanner instance. Defaults to the
    /// kind when empty.
    pub name: String,

    /// Directory the scanner watches. For the cron scanner this is the
    /// directory holding the cron configuration, which doubles as the
    /// default working directory for spawned jobs.
    pub directory: PathBuf,

    /// Quantum of time between two poll ticks. Every scanner sleeps this
    /// long between evaluations. **Measured in seconds**.
    ///
    /// # Note
    ///
    /// Setting this too low makes the deployment scanners hammer the
    /// filesystem with stat calls; once per second is plenty.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub interval: Duration,

    /// File extensions the directory watchers consider when computing the
    /// directory hash. Files with any other extension never influence
    /// change detection.
    pub extensions: Vec<String>,

    /// Sentinel file whose modification time marks the last successful
    /// deployment. The deployment-family scanners refuse to watch for
    /// changes until this file has been touched at least once.
    pub deployment_flag: PathBuf,

    /// Maximum number of compressed rotations the logrotate scanner keeps
    /// per watched file. `0` means unlimited retention.
    pub max_files: u32,

    /// Size in bytes above which the logrotate scanner rotates a file.
    /// Clamped to a hard technical ceiling at scanner construction, so
    /// values beyond 2 GiB are quietly reduced.
    pub max_size_bytes: u64,

    /// Staleness threshold for the heartbeat scanner. If the heartbeat
    /// file's modification time falls further behind than this, the server
    /// is restarted. **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub threshold: Duration,

    /// Jobs evaluated by the cron scanner. Ignored by every other kind.
    pub jobs: Vec<CronJobSpec>,
}

impl Default for ScannerSpec {
    fn default() -> Self {
        Self {
            kind: String::new(),
            name: String::new(),
            directory: PathBuf::new(),
            interval: Duration::from_secs(1),
            extensions: Vec::new(),
            deployment_flag: PathBuf::new(),
            max_files: 10,
            max_size_bytes: 100 * 1024 * 1024,
            threshold: Duration::from_secs(60),
            jobs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CronJobSpec {
    /// Cron expression deciding when the job is due, in the standard
    /// seven-field form (seconds through years; the seconds field may be
    /// `0` for classic five-field behavior).
    pub schedule: String,

    /// Script to execute when the schedule matches.
    pub script: PathBuf,

    /// Working directory for the spawned job. When absent, the directory
    /// containing the cron configuration is used.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}
