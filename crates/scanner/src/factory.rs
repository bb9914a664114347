#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::cron::{CronJob, CronScanner};
use crate::deployment::{DeploymentScanner, WatchStrategy};
use crate::driver::Scanner;
use crate::error::Error;
use crate::hash::DirectoryHasher;
use crate::heartbeat::HeartbeatScanner;
use crate::logrotate::LogrotateScanner;
use crate::restart::{CommandRunner, Restarter, RestartTable};
use config::ScannerSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared collaborators every constructor may draw from: the restart
/// tables from configuration, the command runner, the clock, and the
/// directory probed for release markers.
pub struct ScannerContext {
    pub restart: config::Restart,
    pub runner: Arc<dyn CommandRunner>,
    pub clock: Arc<dyn Clock>,
    pub etc_root: PathBuf,
}

impl ScannerContext {
    pub fn new(
        restart: config::Restart,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            restart,
            runner,
            clock,
            etc_root: PathBuf::from("/etc"),
        }
    }

    fn system_restarter(&self) -> Restarter {
        Restarter::new(RestartTable::new(self.restart.system.clone()), self.runner.clone())
            .with_etc_root(&self.etc_root)
    }

    fn supervisor_restarter(&self) -> Restarter {
        Restarter::new(
            RestartTable::new(self.restart.supervisor.clone()),
            self.runner.clone(),
        )
        .with_etc_root(&self.etc_root)
    }
}

type Constructor = fn(&ScannerContext, &ScannerSpec) -> Result<Box<dyn Scanner>, Error>;

/// The one place polymorphic dispatch over the scanner variants happens.
/// Everything downstream consumes scanners only through the [`Scanner`]
/// capability.
pub struct ScannerFactory {
    registry: BTreeMap<&'static str, Constructor>,
}

impl Default for ScannerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerFactory {
    pub fn new() -> Self {
        let mut registry: BTreeMap<&'static str, Constructor> = BTreeMap::new();
        registry.insert("deployment", build_deployment);
        registry.insert("webapps", build_webapps);
        registry.insert("recursive-directory", build_recursive);
        registry.insert("supervisor-deployment", build_supervisor_deployment);
        registry.insert("cron", build_cron);
        registry.insert("logrotate", build_logrotate);
        registry.insert("heartbeat", build_heartbeat);
        Self { registry }
    }

    pub fn build(
        &self,
        context: &ScannerContext,
        spec: &ScannerSpec,
    ) -> Result<Box<dyn Scanner>, Error> {
        let constructor = self
            .registry
            .get(spec.kind.as_str())
            .ok_or_else(|| Error::UnknownScannerType(spec.kind.clone()))?;
        constructor(context, spec)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registry.keys().copied()
    }
}

fn scanner_name(spec: &ScannerSpec) -> String {
    if spec.name.is_empty() {
        spec.kind.clone()
    } else {
        spec.name.clone()
    }
}

fn flag_file(spec: &ScannerSpec) -> PathBuf {
    if spec.deployment_flag.as_os_str().is_empty() {
        spec.directory.join(".deployed")
    } else {
        spec.deployment_flag.clone()
    }
}

fn watcher(
    spec: &ScannerSpec,
    restarter: Restarter,
    extensions: Vec<String>,
    recursive: bool,
) -> Box<dyn Scanner> {
    let strategy = WatchStrategy {
        directory: spec.directory.clone(),
        hasher: DirectoryHasher::new(extensions, recursive),
    };
    Box::new(DeploymentScanner::new(
        scanner_name(spec),
        strategy,
        flag_file(spec),
        restarter,
    ))
}

fn build_deployment(
    context: &ScannerContext,
    spec: &ScannerSpec,
) -> Result<Box<dyn Scanner>, Error> {
    Ok(watcher(
        spec,
        context.system_restarter(),
        spec.extensions.clone(),
        false,
    ))
}

fn build_webapps(context: &ScannerContext, spec: &ScannerSpec) -> Result<Box<dyn Scanner>, Error> {
    let extensions = if spec.extensions.is_empty() {
        vec!["phar".to_string(), "dodeploy".to_string()]
    } else {
        spec.extensions.clone()
    };
    Ok(watcher(spec, context.system_restarter(), extensions, false))
}

fn build_recursive(
    context: &ScannerContext,
    spec: &ScannerSpec,
) -> Result<Box<dyn Scanner>, Error> {
    Ok(watcher(
        spec,
        context.system_restarter(),
        spec.extensions.clone(),
        true,
    ))
}

fn build_supervisor_deployment(
    context: &ScannerContext,
    spec: &ScannerSpec,
) -> Result<Box<dyn Scanner>, Error> {
    Ok(watcher(
        spec,
        context.supervisor_restarter(),
        spec.extensions.clone(),
        false,
    ))
}

fn build_cron(context: &ScannerContext, spec: &ScannerSpec) -> Result<Box<dyn Scanner>, Error> {
    let jobs = spec
        .jobs
        .iter()
        .map(|job| CronJob::from_spec(job, &spec.directory))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Box::new(CronScanner::new(
        scanner_name(spec),
        jobs,
        context.clock.clone(),
    )))
}

fn build_logrotate(
    context: &ScannerContext,
    spec: &ScannerSpec,
) -> Result<Box<dyn Scanner>, Error> {
    Ok(Box::new(LogrotateScanner::new(
        scanner_name(spec),
        spec.directory.clone(),
        spec.extensions.clone(),
        spec.max_files,
        spec.max_size_bytes,
        context.clock.clone(),
    )))
}

fn build_heartbeat(
    context: &ScannerContext,
    spec: &ScannerSpec,
) -> Result<Box<dyn Scanner>, Error> {
    Ok(Box::new(HeartbeatScanner::new(
        scanner_name(spec),
        spec.directory.clone(),
        spec.threshold,
        context.system_restarter(),
        context.clock.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::restart::ShellRunner;

    fn context() -> ScannerContext {
        ScannerContext::new(
            config::Restart::builtin(),
            Arc::new(ShellRunner),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn builds_every_registered_kind() {
        let factory = ScannerFactory::new();
        let context = context();
        for kind in [
            "deployment",
            "webapps",
            "recursive-directory",
            "supervisor-deployment",
            "cron",
            "logrotate",
            "heartbeat",
        ] {
            let spec = ScannerSpec {
                kind: kind.to_string(),
                directory: "/tmp".into(),
                ..Default::default()
            };
            let scanner = factory.build(&context, &spec).unwrap();
            assert_eq!(scanner.name(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let factory = ScannerFactory::new();
        let spec = ScannerSpec {
            kind: "telegraph".to_string(),
            ..Default::default()
        };
        let err = factory.build(&context(), &spec).unwrap_err();
        assert!(matches!(err, Error::UnknownScannerType(kind) if kind == "telegraph"));
    }

    #[test]
    fn invalid_cron_job_fails_at_construction() {
        let factory = ScannerFactory::new();
        let spec = ScannerSpec {
            kind: "cron".to_string(),
            directory: "/tmp".into(),
            jobs: vec![config::CronJobSpec {
                schedule: "bogus".to_string(),
                script: "/tmp/job.sh".into(),
                workdir: None,
            }],
            ..Default::default()
        };
        assert!(factory.build(&context(), &spec).is_err());
    }
}
