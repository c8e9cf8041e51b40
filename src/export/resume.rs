//! Reconstruction of already-completed work at the start of a run.
//!
//! Nothing is persisted besides the CSV index and the exported files
//! themselves. Each run rebuilds two sets of handle suffixes from them:
//! records already in the CSV, and records whose file is already on disk.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::writer::TEMP_SUFFIX;

/// Handle suffixes already done, computed once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Suffixes with a row in the CSV index.
    pub csv_done: HashSet<String>,
    /// Suffixes with a file `<suffix>.<ext>` in the export directory.
    pub files_present: HashSet<String>,
}

impl ResumeState {
    /// Builds a state from explicit sets.
    #[must_use]
    pub fn new(csv_done: HashSet<String>, files_present: HashSet<String>) -> Self {
        Self {
            csv_done,
            files_present,
        }
    }

    /// Scans the CSV index and the export directory.
    ///
    /// Stale temporary files left by an interrupted run are removed. Unreadable
    /// inputs are logged and treated as empty.
    #[must_use]
    pub fn scan(csv_path: &Path, export_dir: &Path, file_suffix: &str) -> Self {
        let csv_done = read_csv_done(csv_path);
        let files_present = scan_files_present(export_dir, file_suffix);
        info!(
            csv_rows = csv_done.len(),
            files = files_present.len(),
            "resume state reconstructed"
        );
        Self::new(csv_done, files_present)
    }

    /// Whether a row for `suffix` was already written.
    #[must_use]
    pub fn is_recorded(&self, suffix: &str) -> bool {
        self.csv_done.contains(suffix)
    }

    /// Whether the file for `suffix` is already on disk.
    #[must_use]
    pub fn has_file(&self, suffix: &str) -> bool {
        self.files_present.contains(suffix)
    }

    /// Records this run's own write of `suffix`.
    pub fn mark_recorded(&mut self, suffix: &str) {
        self.csv_done.insert(suffix.to_string());
        self.files_present.insert(suffix.to_string());
    }
}

/// Collects handle suffixes from the `Handle` column of an existing CSV index.
///
/// A missing file yields an empty set. Bytes after the last newline belong to
/// a row torn by a crash and are ignored, since that row will be truncated
/// when the index is reopened. Reading stops at the first malformed record,
/// keeping what was read before it.
#[must_use]
pub fn read_csv_done(csv_path: &Path) -> HashSet<String> {
    let mut done = HashSet::new();

    let bytes = match fs::read(csv_path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return done,
        Err(error) => {
            warn!(path = %csv_path.display(), error = %error, "could not read existing CSV");
            return done;
        }
    };
    let complete = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    if complete < bytes.len() {
        warn!(
            path = %csv_path.display(),
            dropped_bytes = bytes.len() - complete,
            "ignoring unterminated last CSV row"
        );
    }
    if complete == 0 {
        return done;
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(&bytes[..complete]);

    let handle_column = match reader.headers() {
        Ok(headers) => headers.iter().position(|h| h == "Handle"),
        Err(error) => {
            warn!(path = %csv_path.display(), error = %error, "could not read CSV header");
            return done;
        }
    };
    let Some(handle_column) = handle_column else {
        warn!(path = %csv_path.display(), "existing CSV has no Handle column");
        return done;
    };

    for record in reader.records() {
        match record {
            Ok(record) => {
                if let Some((_, suffix)) = record
                    .get(handle_column)
                    .and_then(|url| url.rsplit_once('/'))
                    && !suffix.is_empty()
                {
                    done.insert(suffix.to_string());
                }
            }
            Err(error) => {
                warn!(path = %csv_path.display(), error = %error, "stopped reading CSV at malformed record");
                break;
            }
        }
    }

    done
}

/// Collects handle suffixes of `<suffix>.<ext>` files in `export_dir` and
/// removes stale `<suffix>.<ext>.tmp` files.
#[must_use]
pub fn scan_files_present(export_dir: &Path, file_suffix: &str) -> HashSet<String> {
    let mut present = HashSet::new();
    let stale_ending = format!(".{file_suffix}{TEMP_SUFFIX}");

    let entries = match fs::read_dir(export_dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(path = %export_dir.display(), error = %error, "could not scan export directory");
            return present;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }

        let is_stale = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.ends_with(&stale_ending));
        if is_stale {
            match fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "removed stale temporary file"),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "could not remove stale temporary file");
                }
            }
            continue;
        }

        if path.extension() == Some(OsStr::new(file_suffix))
            && let Some(stem) = path.file_stem().and_then(OsStr::to_str)
        {
            present.insert(stem.to_string());
        }
    }

    present
}
