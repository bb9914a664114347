use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Restart-command tables, keyed by operating-system identifier.
///
/// The entry for an OS is either a single command, or a map from
/// distribution major version to command with an optional `default` key
/// used when no version bucket matches. The tables are plain configuration
/// data so that deployment targets can override them without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Restart {
    /// Commands that restart the server through the init system. This table
    /// backs the regular deployment scanners.
    pub system: BTreeMap<String, OsCommands>,

    /// Commands that restart the server through a process supervisor
    /// (supervisord and friends). This table backs the
    /// `supervisor-deployment` scanner variant.
    pub supervisor: BTreeMap<String, OsCommands>,
}

/// Either one command for every version of an OS, or a per-version table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OsCommands {
    Single(String),
    Versioned(BTreeMap<String, String>),
}

impl Restart {
    /// A reasonable built-in system table covering the distributions the
    /// probe in the scanner crate can detect. Used when the configuration
    /// carries no `[restart]` section.
    pub fn builtin() -> Self {
        let mut system = BTreeMap::new();
        system.insert(
            "debian".to_string(),
            OsCommands::Single("service appserver restart".to_string()),
        );
        let mut redhat = BTreeMap::new();
        redhat.insert("6".to_string(), "service appserver restart".to_string());
        redhat.insert(
            "7".to_string(),
            "systemctl restart appserver".to_string(),
        );
        redhat.insert(
            "default".to_string(),
            "systemctl restart appserver".to_string(),
        );
        system.insert("redhat".to_string(), OsCommands::Versioned(redhat));
        system.insert(
            "darwin".to_string(),
            OsCommands::Single("launchctl kickstart -k system/appserver".to_string()),
        );

        let mut supervisor = BTreeMap::new();
        supervisor.insert(
            "linux".to_string(),
            OsCommands::Single("supervisorctl restart appserver".to_string()),
        );

        Self { system, supervisor }
    }
}
