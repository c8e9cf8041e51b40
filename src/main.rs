//! CLI entry point for the repository archive export.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use libsafe_export::config::LOG_FILE_VAR;
use libsafe_export::{
    ContentClient, Database, ExportConfig, ExportEngine, ExportRequest, ExportSettings,
    ExportSummary, SqlMetadataStore,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

use cli::Args;

/// Process outcome, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Failure,
    Interrupted,
}

impl ProcessExit {
    fn from_summary(summary: &ExportSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.has_errors() {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let env_loaded = load_env_file(args.env_file.as_deref());

    let log_file = args
        .log_file
        .clone()
        .or_else(|| std::env::var_os(LOG_FILE_VAR).map(PathBuf::from));
    let log_file = match log_file.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(error) => {
            eprintln!("error: {error:#}");
            return ProcessExit::Failure.into();
        }
    };
    init_tracing(args.default_log_level(), log_file);

    debug!(?args, "CLI arguments parsed");
    match env_loaded {
        Ok(Some(path)) => debug!(path = %path.display(), "loaded environment file"),
        Ok(None) => {}
        Err(error) => {
            error!(error = %format!("{error:#}"), "could not load environment file");
            return ProcessExit::Failure.into();
        }
    }

    match run(&args).await {
        Ok(exit) => exit.into(),
        Err(error) => {
            error!(error = %format!("{error:#}"), "export failed");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: &Args) -> Result<ProcessExit> {
    // Date range is checked before configuration so a bad invocation fails fast
    let request = ExportRequest::new(args.start.as_deref(), args.end.as_deref(), args.number)
        .context("invalid date range")?;

    let config = ExportConfig::from_env().context("invalid configuration")?;
    debug!(?config, "configuration loaded");
    info!(
        export_dir = %config.export_dir.display(),
        start = ?request.start(),
        end = ?request.end(),
        limit = request.limit(),
        "export starting"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(Arc::clone(&interrupted));

    let db = Database::connect(config.database_url())
        .await
        .context("could not connect to the metadata database")?;
    let client = match ContentClient::new(&config.repository) {
        Ok(client) => client,
        Err(error) => {
            db.close().await;
            return Err(error).context("could not build the repository client");
        }
    };
    let store = SqlMetadataStore::new(
        &db,
        config.community_handles.clone(),
        config.file_suffix.clone(),
    );

    let outcome = {
        let mut engine = ExportEngine::new(&store, &client, ExportSettings::from_config(&config))
            .with_interrupt(Arc::clone(&interrupted));
        if should_show_progress(args.quiet) {
            engine = engine.with_progress(progress_bar());
        }
        engine.run(&request).await
    };

    client.close().await;
    db.close().await;

    let summary = outcome.context("export aborted")?;
    summary.log();
    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("could not encode summary")?;
        println!("{json}");
    }

    if summary.interrupted {
        warn!("Interrupted. Run again to resume.");
    }
    Ok(ProcessExit::from_summary(&summary))
}

/// Loads `path`, or `./.env` when none is given. A missing default file is
/// not an error.
fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .with_context(|| format!("could not read {}", path.display())),
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(error) if error.not_found() => Ok(None),
            Err(error) => Err(error).context("could not read .env"),
        },
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open log file {}", path.display()))
}

// Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
fn init_tracing(default_level: &str, log_file: Option<File>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init();
}

/// First Ctrl-C asks the engine to stop before the next record; a second one
/// exits immediately.
fn spawn_interrupt_handler(interrupted: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current record. Press Ctrl-C again to abort.");
            interrupted.store(true, Ordering::SeqCst);
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Second interrupt, exiting");
                std::process::exit(130);
            }
        }
    });
}

fn should_show_progress(quiet: bool) -> bool {
    let dumb_terminal = std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false);
    io::stderr().is_terminal() && !quiet && !dumb_terminal
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
