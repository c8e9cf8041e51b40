//! Run counters and the end-of-run summary.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

/// Counters accumulated while iterating candidates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportStats {
    processed: usize,
    successful: usize,
    skipped: usize,
    errors: usize,
}

impl ExportStats {
    /// Creates a tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates the loop reached.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Rows written this run.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.successful
    }

    /// Candidates already in the CSV.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Candidates that failed.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub(crate) fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub(crate) fn record_success(&mut self) {
        self.successful += 1;
    }

    pub(crate) fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_error(&mut self) {
        self.errors += 1;
    }
}

/// Summary of one run, produced once from the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    /// Eligible, non-embargoed candidates (not truncated by the limit).
    pub total_handles: usize,
    /// Candidates the loop reached.
    pub processed: usize,
    /// Rows written.
    pub successful: usize,
    /// Candidates already in the CSV.
    pub skipped: usize,
    /// Candidates that failed.
    pub errors: usize,
    /// Wall time of the run.
    pub elapsed_seconds: f64,
    /// The CSV index.
    pub csv_path: PathBuf,
    /// Requested limit; 0 is unbounded.
    pub limit: usize,
    /// Whether a non-zero limit was reached.
    pub limit_reached: bool,
    /// Whether the run stopped on an operator interrupt.
    pub interrupted: bool,
}

impl ExportSummary {
    /// Whether any candidate failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Emits the summary as structured log events.
    pub fn log(&self) {
        info!(
            total_handles = self.total_handles,
            processed = self.processed,
            successful = self.successful,
            skipped = self.skipped,
            errors = self.errors,
            elapsed_seconds = format!("{:.2}", self.elapsed_seconds),
            csv_path = %self.csv_path.display(),
            "export summary"
        );
        if self.limit > 0 {
            info!(
                limit = self.limit,
                limit_reached = self.limit_reached,
                "download limit"
            );
        }
        if self.interrupted {
            info!("export interrupted; rerun to resume");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_independently() {
        let mut stats = ExportStats::new();
        stats.record_processed();
        stats.record_processed();
        stats.record_processed();
        stats.record_success();
        stats.record_skip();
        stats.record_error();
        assert_eq!(
            (
                stats.processed(),
                stats.successful(),
                stats.skipped(),
                stats.errors()
            ),
            (3, 1, 1, 1)
        );
    }

    #[test]
    fn test_summary_serializes_every_field() {
        let summary = ExportSummary {
            total_handles: 5,
            processed: 2,
            successful: 2,
            skipped: 0,
            errors: 0,
            elapsed_seconds: 1.5,
            csv_path: PathBuf::from("/export/metadata.csv"),
            limit: 2,
            limit_reached: true,
            interrupted: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_handles"], 5);
        assert_eq!(json["csv_path"], "/export/metadata.csv");
        assert_eq!(json["limit_reached"], true);
        assert_eq!(json["interrupted"], false);
        assert!(!summary.has_errors());
    }
}
