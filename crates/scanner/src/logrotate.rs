#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::driver::Scanner;
use crate::error::Error;
use crate::hash::DirectoryHasher;
use async_trait::async_trait;
use chrono::{DateTime, Days, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Hard technical ceiling for the size trigger. Keeps the configured
/// threshold inside `i32` range so the byte counters cannot overflow on
/// 32-bit platforms.
pub const MAX_ROTATION_SIZE: u64 = i32::MAX as u64;

/// Rotates watched files by size or date, gzips rotated files and prunes
/// compressed rotations beyond the retention count. Rotation state is not
/// persisted: the iteration counter is re-derived each tick from the
/// compressed rotations present on disk.
pub struct LogrotateScanner {
    name: String,
    directory: PathBuf,
    hasher: DirectoryHasher,
    max_files: u32,
    max_size_bytes: u64,
    clock: Arc<dyn Clock>,
    next_rotation: HashMap<PathBuf, DateTime<Utc>>,
}

impl LogrotateScanner {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        extensions: Vec<String>,
        max_files: u32,
        max_size_bytes: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            hasher: DirectoryHasher::new(extensions, false),
            max_files,
            max_size_bytes: max_size_bytes.min(MAX_ROTATION_SIZE),
            clock,
            next_rotation: HashMap::new(),
        }
    }

    fn handle_file(&mut self, file: &Path, now: DateTime<Utc>) -> Result<(), Error> {
        let due_date = now >= *self
            .next_rotation
            .entry(file.to_path_buf())
            .or_insert_with(|| next_midnight(now));
        let size = std::fs::metadata(file)?.len();
        let due_size = size >= self.max_size_bytes;

        if due_date || due_size {
            let iteration = count_compressed(file)? + 1;
            let rotated = rotation_name(file, iteration);
            info!(
                scanner = self.name,
                file = %file.display(),
                rotated = %rotated.display(),
                due_date,
                due_size,
                "rotating"
            );
            std::fs::rename(file, &rotated)?;
            if due_date {
                self.next_rotation
                    .insert(file.to_path_buf(), next_midnight(now));
            }
        }

        compress_rotated(file)?;
        if self.max_files > 0 {
            prune(file, self.max_files)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Scanner for LogrotateScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        let files: Vec<PathBuf> = self.hasher.list(&self.directory)?.into_keys().collect();
        // Files that vanished from the directory take their rotation
        // state with them; the map stays bounded over a long run.
        self.next_rotation.retain(|path, _| files.contains(path));
        for file in &files {
            // One file's failure must not starve the others this tick.
            if let Err(err) = self.handle_file(file, now) {
                warn!(scanner = self.name, file = %file.display(), %err, "rotation failed");
            }
        }
        Ok(())
    }
}

/// `{filename}.{iteration}` -- textual substitution, no zero padding.
fn rotation_name(file: &Path, iteration: usize) -> PathBuf {
    PathBuf::from(format!("{}.{}", file.display(), iteration))
}

/// Existing compressed rotations (`{filename}.{n}.gz`) for a live file,
/// sorted ascending by name.
fn compressed_rotations(file: &Path) -> Result<Vec<PathBuf>, Error> {
    siblings(file, |rest| {
        rest.strip_suffix(".gz")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    })
}

fn count_compressed(file: &Path) -> Result<usize, Error> {
    Ok(compressed_rotations(file)?.len())
}

/// Rotated-but-uncompressed siblings (`{filename}.{n}`).
fn uncompressed_rotations(file: &Path) -> Result<Vec<PathBuf>, Error> {
    siblings(file, |rest| {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Directory entries named `{filename}.{rest}` where `rest` satisfies the
/// filter, sorted ascending by name.
fn siblings(file: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, Error> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let Some(base) = file.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{base}.");
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(rest) = name.strip_prefix(&prefix) {
            if keep(rest) {
                matches.push(entry.path());
            }
        }
    }
    matches.sort();
    Ok(matches)
}

/// Gzip every rotated-but-uncompressed sibling of `file` to `{name}.gz`
/// and delete the uncompressed copy.
fn compress_rotated(file: &Path) -> Result<(), Error> {
    for rotated in uncompressed_rotations(file)? {
        let target = PathBuf::from(format!("{}.gz", rotated.display()));
        let data = std::fs::read(&rotated)?;
        let out = std::fs::File::create(&target)?;
        let mut encoder = GzEncoder::new(out, Compression::default());
        encoder.write_all(&data)?;
        encoder.finish()?;
        std::fs::remove_file(&rotated)?;
    }
    Ok(())
}

/// Keep the newest `max_files` compressed rotations (descending name
/// order), delete the rest.
fn prune(file: &Path, max_files: u32) -> Result<(), Error> {
    let mut compressed = compressed_rotations(file)?;
    compressed.sort_by(|a, b| b.cmp(a));
    for stale in compressed.into_iter().skip(max_files as usize) {
        info!(file = %stale.display(), "pruning rotated log");
        std::fs::remove_file(&stale)?;
    }
    Ok(())
}

fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default())
}
