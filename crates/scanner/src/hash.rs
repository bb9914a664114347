#![forbid(unsafe_code)]

use crate::error::Error;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Lists and digests the files of a watched directory. The digest covers
/// the `{filename -> mtime}` set of every file whose extension is in the
/// watched set, so any add, remove or touch of a matched file changes it
/// while unmatched files never do.
#[derive(Debug, Clone)]
pub struct DirectoryHasher {
    extensions: Vec<String>,
    recursive: bool,
}

impl DirectoryHasher {
    /// `extensions` are matched case-insensitively and without the leading
    /// dot. An empty set matches every file.
    pub fn new(extensions: Vec<String>, recursive: bool) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            extensions,
            recursive,
        }
    }

    /// All matched files with their mtimes, sorted by path.
    pub fn list(&self, dir: &Path) -> Result<BTreeMap<PathBuf, u64>, Error> {
        if self.recursive {
            self.list_recursive(dir)
        } else {
            self.list_flat(dir)
        }
    }

    /// Digest of the matched filename/mtime set, hex-encoded.
    pub fn digest(&self, dir: &Path) -> Result<String, Error> {
        let mut hasher = Sha256::new();
        for (path, mtime) in self.list(dir)? {
            hasher.update(path.as_os_str().as_encoded_bytes());
            hasher.update([0u8]);
            hasher.update(mtime.to_be_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn list_flat(&self, dir: &Path) -> Result<BTreeMap<PathBuf, u64>, Error> {
        let mut files = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !self.matches(&path) {
                continue;
            }
            files.insert(path.clone(), last_file_touch(&path));
        }
        Ok(files)
    }

    fn list_recursive(&self, dir: &Path) -> Result<BTreeMap<PathBuf, u64>, Error> {
        let mut files = BTreeMap::new();
        if self.extensions.is_empty() {
            collect_recursive(dir, &mut |path| {
                files.insert(path.to_path_buf(), last_file_touch(path));
            })?;
            return Ok(files);
        }
        // One recursive glob per watched extension, mtimes folded in per file.
        for ext in &self.extensions {
            let pattern = format!("{}/**/*.{}", dir.display(), ext);
            for path in glob::glob(&pattern)?.flatten() {
                if path.is_file() {
                    files.insert(path.clone(), last_file_touch(&path));
                }
            }
        }
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|watched| *watched == ext)
            })
    }
}

fn collect_recursive(dir: &Path, insert: &mut impl FnMut(&Path)) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_recursive(&path, insert)?;
        } else if path.is_file() {
            insert(&path);
        }
    }
    Ok(())
}

/// Modification time of `path` as unix seconds, or `0` when the file does
/// not exist. A zero means "never touched" to the deployment gate.
pub fn last_file_touch(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |age| age.as_secs())
}
