//! Sequential export loop.
//!
//! The engine walks eligible handles in lookup order and, for each one, either
//! skips it (already in the CSV), records an existing file, or downloads the
//! first retrievable content item and records it. Rows are appended only once
//! the file is in place, so every row on disk refers to a complete file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use indicatif::ProgressBar;
use tracing::{debug, error, info, instrument, warn};

use super::csv_sink::MetadataCsv;
use super::error::ExportError;
use super::record::ExportRow;
use super::request::ExportRequest;
use super::resume::ResumeState;
use super::stats::{ExportStats, ExportSummary};
use super::writer::write_atomic;
use crate::config::ExportConfig;
use crate::download::ContentSource;
use crate::metadata::MetadataStore;
use crate::validation::{
    handle_suffix, sanitize_filename, validate_file_size, validate_handle, validate_mime_type,
    validate_safe_path,
};

/// Output settings the engine needs from the configuration.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Directory receiving exported files.
    pub export_dir: PathBuf,
    /// CSV index path.
    pub csv_path: PathBuf,
    /// Prefix for the `Handle` column.
    pub handle_base_url: String,
    /// Downloads larger than this are rejected.
    pub max_file_size: u64,
    /// Tracked file extension, without the dot.
    pub file_suffix: String,
    /// Expected content type.
    pub mime_type: String,
}

impl ExportSettings {
    /// Extracts the export settings from a full configuration.
    #[must_use]
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            export_dir: config.export_dir.clone(),
            csv_path: config.csv_path(),
            handle_base_url: config.handle_base_url.clone(),
            max_file_size: config.max_file_size,
            file_suffix: config.file_suffix.clone(),
            mime_type: config.mime_type.clone(),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Recorded,
    Skipped,
    Failed,
}

/// Runs one export over a metadata store and a content source.
pub struct ExportEngine<'a> {
    store: &'a dyn MetadataStore,
    source: &'a dyn ContentSource,
    settings: ExportSettings,
    interrupted: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl std::fmt::Debug for ExportEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportEngine")
            .field("settings", &self.settings)
            .field("interrupted", &self.interrupted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<'a> ExportEngine<'a> {
    /// Creates an engine with no interrupt source and no progress bar.
    #[must_use]
    pub fn new(
        store: &'a dyn MetadataStore,
        source: &'a dyn ContentSource,
        settings: ExportSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            interrupted: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Uses `flag` as the interrupt signal. The loop stops before the next
    /// candidate once it is set.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Reports per-candidate progress on `bar`.
    #[must_use]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Output settings of this engine.
    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Runs an export as of today, reconstructing resume state from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Lookup`] if the metadata store fails, or
    /// [`ExportError::Csv`] / [`ExportError::Io`] if the CSV index cannot be
    /// opened or written. Per-record failures are counted, not returned.
    pub async fn run(&self, request: &ExportRequest) -> Result<ExportSummary, ExportError> {
        self.run_as_of(request, Local::now().date_naive()).await
    }

    /// Same as [`run`](Self::run) with an explicit embargo reference date.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_as_of(
        &self,
        request: &ExportRequest,
        today: NaiveDate,
    ) -> Result<ExportSummary, ExportError> {
        let started = Instant::now();
        let handles = self.eligible_handles(request, today).await?;
        let state = ResumeState::scan(
            &self.settings.csv_path,
            &self.settings.export_dir,
            &self.settings.file_suffix,
        );
        self.process(request, &handles, state, started).await
    }

    /// Runs with caller-supplied resume state instead of scanning disk.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_state(
        &self,
        request: &ExportRequest,
        today: NaiveDate,
        state: ResumeState,
    ) -> Result<ExportSummary, ExportError> {
        let started = Instant::now();
        let handles = self.eligible_handles(request, today).await?;
        self.process(request, &handles, state, started).await
    }

    #[instrument(skip(self, request), fields(start = ?request.start(), end = ?request.end()))]
    async fn eligible_handles(
        &self,
        request: &ExportRequest,
        today: NaiveDate,
    ) -> Result<Vec<String>, ExportError> {
        let embargoed = self.store.list_embargoed_handles(today).await?;
        let candidates = self
            .store
            .list_eligible_handles(request.start(), request.end())
            .await?;

        let candidate_count = candidates.len();
        let handles: Vec<String> = candidates
            .into_iter()
            .filter(|handle| !embargoed.contains(handle))
            .collect();

        info!(
            candidates = candidate_count,
            embargoed = candidate_count - handles.len(),
            eligible = handles.len(),
            "eligible handles loaded"
        );
        Ok(handles)
    }

    async fn process(
        &self,
        request: &ExportRequest,
        handles: &[String],
        mut state: ResumeState,
        started: Instant,
    ) -> Result<ExportSummary, ExportError> {
        let mut csv = MetadataCsv::open(&self.settings.csv_path)?;
        let mut stats = ExportStats::new();
        let mut interrupted = false;

        if let Some(bar) = &self.progress {
            bar.set_length(handles.len() as u64);
        }

        for handle in handles {
            if request.limit_reached(stats.successful()) {
                info!(limit = request.limit(), "download limit reached");
                break;
            }
            if self.interrupted.load(Ordering::SeqCst) {
                warn!(processed = stats.processed(), "interrupt received, stopping");
                interrupted = true;
                break;
            }

            stats.record_processed();
            if let Some(bar) = &self.progress {
                bar.set_message(handle.clone());
            }

            match self.export_one(handle, &mut state, &mut csv).await? {
                Outcome::Recorded => stats.record_success(),
                Outcome::Skipped => stats.record_skip(),
                Outcome::Failed => stats.record_error(),
            }

            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        csv.close()?;

        Ok(ExportSummary {
            total_handles: handles.len(),
            processed: stats.processed(),
            successful: stats.successful(),
            skipped: stats.skipped(),
            errors: stats.errors(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            csv_path: self.settings.csv_path.clone(),
            limit: request.limit(),
            limit_reached: request.limit_reached(stats.successful()),
            interrupted,
        })
    }

    #[instrument(skip(self, state, csv))]
    async fn export_one(
        &self,
        handle: &str,
        state: &mut ResumeState,
        csv: &mut MetadataCsv,
    ) -> Result<Outcome, ExportError> {
        if let Err(e) = validate_handle(handle) {
            warn!(error = %e, "skipping invalid handle");
            return Ok(Outcome::Failed);
        }
        let suffix = handle_suffix(handle);

        if state.is_recorded(suffix) {
            debug!("already in CSV index");
            return Ok(Outcome::Skipped);
        }

        let file_name = sanitize_filename(&format!("{suffix}.{}", self.settings.file_suffix));
        let row = ExportRow::assemble(
            self.store,
            handle,
            &self.settings.handle_base_url,
            file_name.clone(),
        )
        .await?;

        let target = self.settings.export_dir.join(&file_name);
        if let Err(e) = validate_safe_path(&target, &self.settings.export_dir) {
            error!(error = %e, "target path escapes export directory");
            return Ok(Outcome::Failed);
        }

        if state.has_file(suffix) {
            csv.append(&row)?;
            state.mark_recorded(suffix);
            info!(file = %file_name, "recorded existing file");
            return Ok(Outcome::Recorded);
        }

        let file_ids = self.store.get_file_identifiers(handle).await?;
        if file_ids.is_empty() {
            warn!("no content items to download");
            return Ok(Outcome::Failed);
        }

        for file_id in &file_ids {
            if self.download(file_id, &target).await {
                csv.append(&row)?;
                state.mark_recorded(suffix);
                info!(file = %file_name, file_id = %file_id, "exported");
                return Ok(Outcome::Recorded);
            }
        }

        warn!(attempted = file_ids.len(), "every content item failed");
        Ok(Outcome::Failed)
    }

    /// Fetches `file_id` and places it at `target`. Returns whether the file is
    /// now in place.
    async fn download(&self, file_id: &str, target: &Path) -> bool {
        let content = match self.source.fetch_content(file_id, None).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file_id, error = %e, "fetch failed");
                return false;
            }
        };

        if let Err(e) = validate_file_size(content.bytes.len() as u64, self.settings.max_file_size)
        {
            warn!(file_id, error = %e, "rejected download");
            return false;
        }

        if let Some(content_type) = content.content_type.as_deref()
            && let Err(e) = validate_mime_type(content_type, &self.settings.mime_type)
        {
            warn!(file_id, error = %e, "unexpected content type, keeping file");
        }

        match write_atomic(target, &content.bytes).await {
            Ok(()) => true,
            Err(e) => {
                error!(file_id, path = %target.display(), error = %e, "could not write file");
                false
            }
        }
    }
}
