//! Metadata lookup service.
//!
//! Read-only, parameterized lookups against the repository metadata table:
//! eligible-record discovery, embargo discovery, field values and file
//! identifiers. The [`MetadataStore`] trait is the seam the export engine
//! depends on; [`SqlMetadataStore`] implements it over a [`Database`](crate::Database).

mod error;
mod sql;
mod store;

pub use error::LookupError;
pub use sql::SqlMetadataStore;
pub use store::MetadataStore;

/// Record classification field.
pub const FIELD_TYPE: &str = "dc.type";
/// Title field.
pub const FIELD_TITLE: &str = "dc.title";
/// Author field (multi-valued).
pub const FIELD_AUTHOR: &str = "dc.contributor.author";
/// DOI field.
pub const FIELD_DOI: &str = "dc.identifier.doi";
/// Publication date field.
pub const FIELD_DATE_ISSUED: &str = "dc.date.issued";
/// Record creation date field.
pub const FIELD_DATE_ACCESSIONED: &str = "dc.date.accessioned";

/// Parent collection membership field.
pub(crate) const FIELD_COMMUNITY: &str = "dspace.community.handle";
/// Embargo release date field.
pub(crate) const FIELD_EMBARGO: &str = "dc.rights.embargodate";
/// File group name field.
pub(crate) const FIELD_BUNDLE_NAME: &str = "dspace.bundle.name";
/// File identifier field; its rows also carry the attachment timestamp.
pub(crate) const FIELD_BITSTREAM_UUID: &str = "dspace.bitstream.uuid";
/// File name field, child of the identifier row.
pub(crate) const FIELD_BITSTREAM_NAME: &str = "dspace.bitstream.name";

/// File group holding primary content.
pub(crate) const ORIGINAL_BUNDLE: &str = "ORIGINAL";

/// Source tag of rows harvested from the repository.
pub(crate) const REPOSITORY_SOURCE: &str = "repository";

/// Work types eligible for export.
pub const EXPORTABLE_TYPES: [&str; 11] = [
    "Article",
    "Book",
    "Book Chapter",
    "Conference Paper",
    "Dissertation",
    "Patent",
    "Preprint",
    "Protocol",
    "Report",
    "Technical Report",
    "Thesis",
];
