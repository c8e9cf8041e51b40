//! Assembly of one CSV row from a record's metadata.

use crate::metadata::{
    FIELD_AUTHOR, FIELD_DATE_ACCESSIONED, FIELD_DATE_ISSUED, FIELD_DOI, FIELD_TITLE, FIELD_TYPE,
    LookupError, MetadataStore,
};

/// Separator placed between the values of a multi-valued field.
pub const VALUE_SEPARATOR: &str = "; ";

/// Exported metadata columns and their source fields, in CSV order.
pub const WORK_FIELDS: [(&str, &str); 6] = [
    ("Type", FIELD_TYPE),
    ("Title", FIELD_TITLE),
    ("Author", FIELD_AUTHOR),
    ("DOI", FIELD_DOI),
    ("Publication Date", FIELD_DATE_ISSUED),
    ("Repository Record Created", FIELD_DATE_ACCESSIONED),
];

/// CSV header: handle URL, file name, then the metadata columns.
pub const CSV_HEADER: [&str; 8] = [
    "Handle",
    "File",
    WORK_FIELDS[0].0,
    WORK_FIELDS[1].0,
    WORK_FIELDS[2].0,
    WORK_FIELDS[3].0,
    WORK_FIELDS[4].0,
    WORK_FIELDS[5].0,
];

/// One exported record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    /// Fully-qualified handle URL.
    pub handle_url: String,
    /// Local file name inside the export directory.
    pub file_name: String,
    /// Normalized values, aligned with [`WORK_FIELDS`].
    pub fields: [String; 6],
}

impl ExportRow {
    /// Looks up every tracked field of `handle` and normalizes it.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if any field lookup fails.
    pub async fn assemble(
        store: &dyn MetadataStore,
        handle: &str,
        handle_base_url: &str,
        file_name: String,
    ) -> Result<Self, LookupError> {
        let mut fields: [String; 6] = Default::default();
        for (slot, (column, field)) in fields.iter_mut().zip(WORK_FIELDS) {
            let values = store.get_field_values(handle, field).await?;
            *slot = normalize_values(&values, column == "Type");
        }

        Ok(Self {
            handle_url: format!("{handle_base_url}{handle}"),
            file_name,
            fields,
        })
    }

    /// Cells in [`CSV_HEADER`] order.
    #[must_use]
    pub fn cells(&self) -> [&str; 8] {
        [
            self.handle_url.as_str(),
            self.file_name.as_str(),
            self.fields[0].as_str(),
            self.fields[1].as_str(),
            self.fields[2].as_str(),
            self.fields[3].as_str(),
            self.fields[4].as_str(),
            self.fields[5].as_str(),
        ]
    }
}

/// Joins values with `"; "` and collapses every whitespace run to one space.
///
/// With `first_only`, only the part before the first separator of the joined
/// value is kept.
#[must_use]
pub fn normalize_values(values: &[String], first_only: bool) -> String {
    let joined = values.join(VALUE_SEPARATOR);
    let normalized = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    if first_only {
        match normalized.split_once(VALUE_SEPARATOR) {
            Some((first, _)) => first.to_string(),
            None => normalized,
        }
    } else {
        normalized
    }
}
