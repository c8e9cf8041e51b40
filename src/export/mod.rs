//! Export of repository records to a flat directory indexed by a CSV file.
//!
//! # Overview
//!
//! [`ExportEngine`] drives one run: it resolves eligible handles through a
//! [`MetadataStore`](crate::metadata::MetadataStore), downloads content through a
//! [`ContentSource`](crate::download::ContentSource), places each file
//! atomically and appends its row to [`MetadataCsv`]. Resumption needs no
//! state besides the CSV and the files themselves ([`ResumeState`]).

mod csv_sink;
mod engine;
mod error;
mod record;
mod request;
mod resume;
mod stats;
mod writer;

/// File name of the CSV index inside the export directory.
pub const CSV_FILE_NAME: &str = "metadata.csv";

pub use csv_sink::MetadataCsv;
pub use engine::{ExportEngine, ExportSettings};
pub use error::ExportError;
pub use record::{CSV_HEADER, ExportRow, VALUE_SEPARATOR, WORK_FIELDS, normalize_values};
pub use request::ExportRequest;
pub use resume::{ResumeState, read_csv_done, scan_files_present};
pub use stats::{ExportStats, ExportSummary};
pub use writer::{TEMP_SUFFIX, temp_path, write_atomic};
