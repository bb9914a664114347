#![forbid(unsafe_code)]

use crate::error::Error;
use crate::os;
use async_trait::async_trait;
use config::OsCommands;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Immutable OS/distribution to restart-command table. Built from
/// configuration at scanner construction; never a process-wide static, so
/// each deployment target can carry its own commands and tests can inject
/// synthetic tables.
#[derive(Debug, Clone, Default)]
pub struct RestartTable {
    inner: BTreeMap<String, OsCommands>,
}

impl RestartTable {
    pub fn new(inner: BTreeMap<String, OsCommands>) -> Self {
        Self { inner }
    }

    /// Resolve the restart command for an OS and optional distribution
    /// version. Versioned entries are looked up by the floor of the
    /// version (`"6.5"` selects bucket `6`), falling back to the
    /// `default` bucket. An OS absent from the table is a hard error.
    pub fn command(&self, os: &str, version: Option<&str>) -> Result<&str, Error> {
        let entry = self
            .inner
            .get(os)
            .ok_or_else(|| Error::UnsupportedOs(os.to_string()))?;

        match entry {
            OsCommands::Single(command) => Ok(command),
            OsCommands::Versioned(buckets) => {
                if let Some(bucket) = version.and_then(major_version) {
                    if let Some(command) = buckets.get(&bucket) {
                        return Ok(command);
                    }
                }
                buckets
                    .get("default")
                    .map(String::as_str)
                    .ok_or_else(|| Error::UnsupportedOs(os.to_string()))
            }
        }
    }
}

/// `"6.5"` -> `"6"`, `"9"` -> `"9"`. Non-numeric versions have no bucket.
fn major_version(version: &str) -> Option<String> {
    let major = version.split('.').next()?;
    major.parse::<u64>().ok().map(|v| v.to_string())
}

/// Seam for shelling out, so tests can record restart invocations instead
/// of spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<(), Error>;
}

/// Runs the command through `sh -c`.
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<(), Error> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await?;
        if !status.success() {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Detects the running OS (refined to a distribution on Linux), resolves
/// the restart command and shells it out. Detection and spawn failures are
/// logged and swallowed: a failed restart skips the cycle, it never kills
/// the scanner loop.
#[derive(Clone)]
pub struct Restarter {
    table: RestartTable,
    runner: Arc<dyn CommandRunner>,
    etc_root: PathBuf,
}

impl Restarter {
    pub fn new(table: RestartTable, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            table,
            runner,
            etc_root: PathBuf::from("/etc"),
        }
    }

    /// Override the directory probed for release markers.
    pub fn with_etc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.etc_root = root.into();
        self
    }

    /// Attempt a restart. Returns `true` when the command ran successfully.
    pub async fn restart(&self) -> bool {
        let (os, version) = match self.identify() {
            Ok(pair) => pair,
            Err(err) => {
                error!(%err, "cannot identify system, restart skipped");
                return false;
            }
        };

        let command = match self.table.command(&os, version.as_deref()) {
            Ok(command) => command,
            Err(err) => {
                error!(%err, os, ?version, "no restart command, restart skipped");
                return false;
            }
        };

        info!(command, os, ?version, "restarting server");
        match self.runner.run(command).await {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "restart command failed");
                false
            }
        }
    }

    fn identify(&self) -> Result<(String, Option<String>), Error> {
        let os = os::os_id();
        if os == "linux" {
            let distro = os::detect_distribution_in(Path::new(&self.etc_root))?;
            Ok((distro.id, distro.version))
        } else {
            Ok((os.to_string(), None))
        }
    }
}
