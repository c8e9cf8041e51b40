//! Append-only CSV index of exported records.
//!
//! The header is written once in the file's lifetime. Every row is flushed and
//! synced before [`MetadataCsv::append`] returns, so a row on disk always
//! refers to a file that is already in place.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::ExportError;
use super::record::{CSV_HEADER, ExportRow};

/// Open CSV index for one run.
pub struct MetadataCsv {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl std::fmt::Debug for MetadataCsv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCsv")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

impl MetadataCsv {
    /// Opens `path` for appending, creating it with a header if it is missing
    /// or empty.
    ///
    /// Bytes after the last newline of an existing file belong to a row torn by
    /// a crash. They are truncated away before appending, so the torn record
    /// never becomes a row of its own. A file without any newline has a torn
    /// header and is started over.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] or [`ExportError::Csv`] if the file cannot
    /// be opened, repaired or written.
    #[instrument(skip(path), fields(csv = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, ExportError> {
        let existing_len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => 0,
            Err(error) => return Err(ExportError::io(path, error)),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|e| ExportError::io(path, e))?;

        let complete_len = if existing_len == 0 {
            0
        } else {
            complete_prefix_len(&mut file, existing_len).map_err(|e| ExportError::io(path, e))?
        };
        if complete_len < existing_len {
            warn!(
                dropped_bytes = existing_len - complete_len,
                "CSV index ends mid-row, truncating the torn row"
            );
            file.set_len(complete_len)
                .and_then(|()| file.sync_data())
                .map_err(|e| ExportError::io(path, e))?;
        }
        let needs_header = complete_len == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut csv = Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        };

        if needs_header {
            csv.write_synced(&CSV_HEADER)?;
            info!("created CSV index");
        } else {
            debug!(bytes = complete_len, "appending to existing CSV index");
        }

        Ok(csv)
    }

    /// Appends one row and syncs it to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Csv`] or [`ExportError::Io`] if the row cannot be
    /// written or synced.
    pub fn append(&mut self, row: &ExportRow) -> Result<(), ExportError> {
        self.write_synced(&row.cells())?;
        self.rows_written += 1;
        Ok(())
    }

    /// Path of the CSV index.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes and closes the file.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the final flush fails.
    pub fn close(mut self) -> Result<(), ExportError> {
        self.writer
            .flush()
            .map_err(|e| ExportError::io(&self.path, e))?;
        debug!(rows = self.rows_written, "CSV index closed");
        Ok(())
    }

    fn write_synced(&mut self, cells: &[&str; 8]) -> Result<(), ExportError> {
        self.writer
            .write_record(cells)
            .map_err(|e| ExportError::csv(&self.path, e))?;
        self.writer
            .flush()
            .map_err(|e| ExportError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| ExportError::io(&self.path, e))
    }
}

/// Length of the file up to and including its last newline.
fn complete_prefix_len(file: &mut File, len: u64) -> std::io::Result<u64> {
    let mut buf = [0u8; 4096];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..usize::try_from(end - start).unwrap_or_default()];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}
