#![forbid(unsafe_code)]

pub mod clock;
pub mod cron;
pub mod deployment;
pub mod driver;
pub mod error;
pub mod factory;
pub mod hash;
pub mod heartbeat;
pub mod logrotate;
pub mod os;
pub mod restart;

pub use clock::{Clock, SystemClock};
pub use cron::{CronJob, CronScanner};
pub use deployment::{DeploymentScanner, WatchStrategy};
pub use driver::{PollDriver, Scanner};
pub use error::Error;
pub use factory::{ScannerContext, ScannerFactory};
pub use hash::{DirectoryHasher, last_file_touch};
pub use heartbeat::HeartbeatScanner;
pub use logrotate::{LogrotateScanner, MAX_ROTATION_SIZE};
pub use os::{Distribution, detect_distribution, os_id};
pub use restart::{CommandRunner, Restarter, RestartTable, ShellRunner};
