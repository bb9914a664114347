#![forbid(unsafe_code)]

use clap::Parser;
use config::Config;
use scanner::{PollDriver, ScannerContext, ScannerFactory, ShellRunner, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use warden_rs::{cli::Cli, signals::wait_for_shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. For example, `WARDEN_LOG=warn warden-rs -vvv` will
    // still log at the trace level. The environment variable (`WARDEN_LOG`)
    // can only set the log level per crate, not override the verbosity flag.
    // Eg. `WARDEN_LOG=scanner=warn warden-rs -vvv` will log at the trace
    // level for all crates except `scanner` which will log at the warn level.
    let env_filter = EnvFilter::builder()
        .with_default_directive("sqlx=warn".parse()?)
        .with_env_var("WARDEN_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/warden-rs/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/warden-rs/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    // build the scanners
    let context = ScannerContext::new(
        config.restart.clone(),
        Arc::new(ShellRunner),
        Arc::new(SystemClock),
    );
    let factory = ScannerFactory::new();
    let mut scanners = Vec::with_capacity(config.scanners.len());
    for spec in &config.scanners {
        let scanner = factory.build(&context, spec)?;
        info!(name = spec.name, kind = spec.kind, "scanner configured");
        scanners.push((spec.interval, scanner));
    }

    if cli.oneshot {
        for (_, mut scanner) in scanners {
            if let Err(err) = scanner.poll().await {
                error!(scanner = scanner.name(), %err, "oneshot poll failed");
            }
        }
        return Ok(());
    }

    // one driver task per scanner, all hanging off one cancellation token
    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(scanners.len());
    for (interval, scanner) in scanners {
        let driver = PollDriver::new(interval, cancel.clone());
        handles.push(tokio::spawn(driver.run(scanner)));
    }

    wait_for_shutdown().await?;
    info!("shutting down");
    cancel.cancel();
    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "scanner task panicked");
        }
    }
    Ok(())
}
