use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No restart command configured for operating system `{0}`")]
    UnsupportedOs(String),

    #[error("Unknown scanner kind `{0}`")]
    UnknownScannerType(String),

    #[error("Could not detect a Linux distribution (candidates: {candidates:?})")]
    DistroDetection { candidates: Vec<String> },

    #[error("Script {0} is not an executable regular file")]
    ScriptNotExecutable(PathBuf),

    #[error("Script {script} exited with status {status}:\n{output}")]
    ScriptFailed {
        script: PathBuf,
        status: i32,
        output: String,
    },

    #[error("Restart command `{command}` exited with status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("Invalid cron expression `{expression}`: {source}")]
    CronExpression {
        expression: String,
        source: cron::error::Error,
    },

    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
