#![forbid(unsafe_code)]

use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Fixed, ordered list of release-marker files probed under `/etc`.
/// Order matters only for log readability; resolution requires exactly one
/// non-symlinked marker to be present.
const RELEASE_MARKERS: &[(&str, &str)] = &[
    ("redhat-release", "redhat"),
    ("centos-release", "centos"),
    ("fedora-release", "fedora"),
    ("SuSE-release", "suse"),
    ("arch-release", "arch"),
    ("gentoo-release", "gentoo"),
    ("debian_version", "debian"),
    ("lsb-release", "lsb"),
];

/// The generic marker discarded first when more than one candidate matches.
const GENERIC_MARKER: &str = "lsb-release";

/// A detected Linux distribution: identifier plus the version string parsed
/// out of the marker file, when one could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub id: String,
    pub version: Option<String>,
}

/// Operating-system identifier used as the restart-table key. `linux` is
/// refined into a distribution id by [`detect_distribution`].
pub fn os_id() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Detect the running Linux distribution by probing `/etc` release markers.
pub fn detect_distribution() -> Result<Distribution, Error> {
    detect_distribution_in(Path::new("/etc"))
}

/// Probe `root` for release markers. Symlinked markers are skipped: on
/// derivative distributions (Ubuntu-on-Debian and friends) the parent's
/// marker is often a symlink, and following it would misidentify the
/// system. If more than one candidate remains, the generic `lsb-release`
/// marker is discarded and resolution re-attempted; anything other than
/// exactly one candidate after that is a detection failure.
pub fn detect_distribution_in(root: &Path) -> Result<Distribution, Error> {
    let candidates: Vec<(PathBuf, &str)> = RELEASE_MARKERS
        .iter()
        .filter_map(|(marker, id)| {
            let path = root.join(marker);
            let meta = std::fs::symlink_metadata(&path).ok()?;
            if meta.file_type().is_symlink() {
                trace!(?path, "skipping symlinked release marker");
                return None;
            }
            meta.is_file().then_some((path, *id))
        })
        .collect();

    resolve(candidates)
}

fn resolve(mut candidates: Vec<(PathBuf, &str)>) -> Result<Distribution, Error> {
    if candidates.len() > 1 {
        let before = candidates.len();
        candidates.retain(|(path, _)| {
            path.file_name()
                .is_none_or(|name| name != GENERIC_MARKER)
        });
        if candidates.len() < before {
            return resolve(candidates);
        }
    }

    match candidates.as_slice() {
        [(path, id)] => {
            let version = std::fs::read_to_string(path)
                .ok()
                .and_then(|text| parse_version(&text));
            Ok(Distribution {
                id: (*id).to_string(),
                version,
            })
        }
        _ => Err(Error::DistroDetection {
            candidates: candidates
                .into_iter()
                .map(|(_, id)| id.to_string())
                .collect(),
        }),
    }
}

/// Extract the first dotted-numeric token from a release file, e.g.
/// `"CentOS Linux release 7.9.2009 (Core)"` -> `"7.9.2009"`.
fn parse_version(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|token| {
            token
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.')
                && token.chars().any(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
}
