#![forbid(unsafe_code)]

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};

/// warden-rs: deployment and service watchdog
///
/// warden-rs polls deployment directories, cron schedules, log files and
/// heartbeat files, restarting or rotating the services behind them when
/// their triggers fire.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/warden-rs/config.toml` and `/etc/warden-rs/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the
    /// default configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Run every scanner once and exit instead of polling.
    ///
    /// Useful for smoke-testing a configuration before installing the
    /// daemon.
    #[arg(long)]
    pub oneshot: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}
