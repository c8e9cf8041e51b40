//! Lookup seam between the export engine and the metadata store.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::LookupError;

/// Data-access contract for export metadata.
///
/// Every operation binds caller values as query parameters; none builds query
/// text from them.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Handles of exportable works, deduplicated, in a stable order.
    ///
    /// A work is exportable when its type is in
    /// [`EXPORTABLE_TYPES`](super::EXPORTABLE_TYPES) and it belongs to one of
    /// the configured communities. With a bound, it must also have a file whose
    /// first attachment date falls on/after `start` and/or on/before `end`.
    async fn list_eligible_handles(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<String>, LookupError>;

    /// Handles with an embargo release date on or after `as_of`.
    async fn list_embargoed_handles(&self, as_of: NaiveDate)
    -> Result<HashSet<String>, LookupError>;

    /// All current values of `field` on `handle`, in insertion order.
    async fn get_field_values(&self, handle: &str, field: &str)
    -> Result<Vec<String>, LookupError>;

    /// Identifiers of the primary files of `handle` whose name ends in the
    /// tracked suffix, in insertion order.
    async fn get_file_identifiers(&self, handle: &str) -> Result<Vec<String>, LookupError>;
}
