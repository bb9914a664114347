#![forbid(unsafe_code)]

use crate::driver::Scanner;
use crate::error::Error;
use crate::hash::{DirectoryHasher, last_file_touch};
use crate::restart::Restarter;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, trace};

/// What a deployment-family scanner watches: the directory and the hash
/// variant. The webapps and recursive-directory scanners are the same
/// machine with a different strategy value.
#[derive(Debug, Clone)]
pub struct WatchStrategy {
    pub directory: PathBuf,
    pub hasher: DirectoryHasher,
}

#[derive(Debug)]
enum WatchState {
    /// The deployment flag file has never been touched; change detection
    /// is gated until the first successful deployment.
    WaitingForFirstDeployment,
    /// Baseline hash captured, comparing every tick.
    Watching { baseline: String },
    /// Restart issued; waiting for the external deploy process to touch
    /// the flag file again. Hash changes in this state are ignored, so at
    /// most one restart cycle is ever in flight.
    AwaitingRedeploy { flag_before: u64 },
}

/// Directory watcher that triggers a supervised restart when the watched
/// content hash changes. Runs for the process lifetime; there is no
/// terminal state.
pub struct DeploymentScanner {
    name: String,
    strategy: WatchStrategy,
    flag_file: PathBuf,
    restarter: Restarter,
    state: WatchState,
}

impl DeploymentScanner {
    pub fn new(
        name: impl Into<String>,
        strategy: WatchStrategy,
        flag_file: impl Into<PathBuf>,
        restarter: Restarter,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            flag_file: flag_file.into(),
            restarter,
            state: WatchState::WaitingForFirstDeployment,
        }
    }

    fn digest(&self) -> Result<String, Error> {
        self.strategy.hasher.digest(&self.strategy.directory)
    }
}

#[async_trait]
impl Scanner for DeploymentScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<(), Error> {
        match &self.state {
            WatchState::WaitingForFirstDeployment => {
                if last_file_touch(&self.flag_file) == 0 {
                    trace!(scanner = self.name, "waiting for first successful deployment");
                    return Ok(());
                }
                let baseline = self.digest()?;
                info!(scanner = self.name, "first deployment seen, watching");
                self.state = WatchState::Watching { baseline };
                Ok(())
            }

            WatchState::Watching { baseline } => {
                let current = self.digest()?;
                if current == *baseline {
                    return Ok(());
                }
                info!(
                    scanner = self.name,
                    directory = %self.strategy.directory.display(),
                    "change detected"
                );
                let flag_before = last_file_touch(&self.flag_file);
                if self.restarter.restart().await {
                    self.state = WatchState::AwaitingRedeploy { flag_before };
                }
                // On a failed restart the old baseline is kept, so the
                // still-changed hash retries the restart next tick.
                Ok(())
            }

            WatchState::AwaitingRedeploy { flag_before } => {
                let touch = last_file_touch(&self.flag_file);
                if touch == *flag_before {
                    trace!(scanner = self.name, "waiting for redeploy to complete");
                    return Ok(());
                }
                let baseline = self.digest()?;
                debug!(scanner = self.name, "redeploy completed, baseline recomputed");
                self.state = WatchState::Watching { baseline };
                Ok(())
            }
        }
    }
}
