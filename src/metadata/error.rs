//! Error type for metadata lookups.

use thiserror::Error;

/// Failure of a metadata store lookup. Fatal for an export run.
#[derive(Debug, Error)]
pub enum LookupError {
    /// A lookup query failed.
    #[error("metadata lookup '{operation}' failed: {source}")]
    Query {
        /// Which lookup was running.
        operation: &'static str,
        /// The underlying database error.
        #[source]
        source: sqlx::Error,
    },
}

impl LookupError {
    /// Creates a query error for `operation`.
    pub fn query(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Query { operation, source }
    }
}
