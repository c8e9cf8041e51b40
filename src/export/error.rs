//! Errors that abort an export run.
//!
//! Per-record failures (bad handle, unsafe path, failed download) are counted
//! in [`ExportStats`](super::ExportStats), never returned.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metadata::LookupError;
use crate::validation::ValidationError;

/// Run-level export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The request was rejected before any lookup or fetch.
    #[error("invalid export request: {0}")]
    Validation(#[from] ValidationError),

    /// The metadata store failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The CSV index could not be written.
    #[error("CSV index {path}: {source}")]
    Csv {
        /// Path of the CSV index.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// File system error on the CSV index or export directory.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    /// Creates a CSV error for `path`.
    pub fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Creates an I/O error for `path`.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
