#![forbid(unsafe_code)]

use tokio::signal::unix::{SignalKind, signal};
use tracing::debug;

/// Block until a shutdown signal arrives. SIGTERM and SIGINT both count;
/// whichever fires first wins.
pub async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = terminate.recv() => debug!("received SIGTERM"),
        _ = interrupt.recv() => debug!("received SIGINT"),
    }
    Ok(())
}
