//! Content fetch service for the repository REST API.
//!
//! This module provides authenticated retrieval of bitstream content by file
//! identifier.
//!
//! # Features
//!
//! - Login with configured credentials; bearer and anti-forgery tokens are
//!   refreshed from every response
//! - Short-lived token support (no login needed)
//! - Retry of rate-limit, server and network failures with exponential backoff
//! - Distinct errors for authentication, not-found and other API failures
//!
//! # Example
//!
//! ```no_run
//! use libsafe_export::config::ExportConfig;
//! use libsafe_export::download::ContentClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig::from_env()?;
//! let client = ContentClient::new(&config.repository)?;
//! let content = client
//!     .fetch_content("3f2504e0-4f89-11d3-9a0c-0305e82c3301", None)
//!     .await?;
//! println!("fetched {} bytes", content.bytes.len());
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod retry;
mod session;

pub use client::{ContentClient, ContentSource, FetchedContent};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after,
};
pub use session::Session;
