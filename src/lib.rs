//! Repository Archive Export Library
//!
//! Exports repository records (research outputs and theses) whose files are
//! open for release into a flat directory of PDFs indexed by `metadata.csv`,
//! ready for hand-off to a long-term preservation archive.
//!
//! # Architecture
//!
//! - [`validation`] - Input checks for handles, dates, UUIDs, file names and paths
//! - [`config`] - Immutable configuration loaded once from the environment
//! - [`db`] - Scoped database pool over `sqlx::AnyPool`
//! - [`metadata`] - Metadata lookup contract and its SQL implementation
//! - [`download`] - Authenticated content fetch with retry
//! - [`export`] - The export loop, CSV index and resume state

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod download;
pub mod export;
pub mod metadata;
mod user_agent;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigError, ExportConfig, RepositoryConfig};
pub use db::{Database, DbError};
pub use download::{
    ContentClient, ContentSource, FailureType, FetchError, FetchedContent, RetryDecision,
    RetryPolicy, classify_error,
};
pub use export::{
    ExportEngine, ExportError, ExportRequest, ExportSettings, ExportSummary, ResumeState,
};
pub use metadata::{LookupError, MetadataStore, SqlMetadataStore};
pub use validation::ValidationError;
