//! [`MetadataStore`] over the repository `metadata` table.
//!
//! The table is an entity-attribute-value store: one row per (record, field,
//! value), with `parentRowID` linking file rows into their group and name rows
//! into their file, `added` as the harvest timestamp and `deleted` set once a
//! value is withdrawn.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::AnyPool;
use tracing::{debug, instrument};

use super::{
    EXPORTABLE_TYPES, FIELD_BITSTREAM_NAME, FIELD_BITSTREAM_UUID, FIELD_BUNDLE_NAME,
    FIELD_COMMUNITY, FIELD_EMBARGO, FIELD_TYPE, LookupError, MetadataStore, ORIGINAL_BUNDLE,
    REPOSITORY_SOURCE,
};
use crate::Database;
use crate::validation::DATE_FORMAT;

const ELIGIBLE_BASE: &str = "\
SELECT DISTINCT `idInSource` FROM `metadata`
WHERE `source` = ?
AND `field` = ?
AND `value` IN ({types})
AND `deleted` IS NULL
AND `idInSource` IN (
    SELECT `idInSource` FROM `metadata`
    WHERE `source` = ?
    AND `field` = ?
    AND `value` IN (?, ?)
    AND `deleted` IS NULL
)";

// Earliest attachment is per file identifier: a file re-harvested later keeps
// its first `added` date.
const ATTACHED_OPEN: &str = "
AND `idInSource` IN (
    SELECT `idInSource` FROM `metadata`
    WHERE `source` = ?
    AND `field` = ?
    AND `deleted` IS NULL
    AND `value` IN (
        SELECT `value` FROM `metadata`
        WHERE `source` = ?
        AND `field` = ?
        GROUP BY `value`
        HAVING 1 = 1";

const ATTACHED_FROM: &str = " AND DATE(MIN(`added`)) >= ?";
const ATTACHED_UNTIL: &str = " AND DATE(MIN(`added`)) <= ?";
const ATTACHED_CLOSE: &str = "
    )
)";

const ELIGIBLE_ORDER: &str = "
ORDER BY `idInSource`";

const EMBARGOED: &str = "\
SELECT `idInSource` FROM `metadata`
WHERE `source` = ?
AND `field` = ?
AND `value` >= ?
AND `deleted` IS NULL";

const FIELD_VALUES: &str = "\
SELECT `value` FROM `metadata`
WHERE `source` = ?
AND `idInSource` = ?
AND `field` = ?
AND `deleted` IS NULL
ORDER BY `rowID`";

const FILE_IDENTIFIERS: &str = "\
SELECT f.`value`, n.`value` FROM `metadata` f
JOIN `metadata` n ON n.`parentRowID` = f.`rowID`
WHERE f.`source` = ?
AND f.`idInSource` = ?
AND f.`field` = ?
AND f.`deleted` IS NULL
AND n.`source` = ?
AND n.`field` = ?
AND n.`deleted` IS NULL
AND f.`parentRowID` IN (
    SELECT `rowID` FROM `metadata`
    WHERE `source` = ?
    AND `field` = ?
    AND `value` = ?
    AND `deleted` IS NULL
)
ORDER BY f.`rowID`, n.`rowID`";

/// SQL implementation of [`MetadataStore`].
#[derive(Debug, Clone)]
pub struct SqlMetadataStore {
    pool: AnyPool,
    communities: [String; 2],
    file_suffix: String,
}

impl SqlMetadataStore {
    /// Creates a store restricted to `communities`, tracking files whose name
    /// ends in `.{file_suffix}` (case-sensitive).
    #[must_use]
    pub fn new(db: &Database, communities: [String; 2], file_suffix: impl Into<String>) -> Self {
        Self {
            pool: db.pool().clone(),
            communities,
            file_suffix: file_suffix.into(),
        }
    }

    fn eligible_sql(start: bool, end: bool) -> String {
        let placeholders = vec!["?"; EXPORTABLE_TYPES.len()].join(", ");
        let mut sql = ELIGIBLE_BASE.replace("{types}", &placeholders);
        if start || end {
            sql.push_str(ATTACHED_OPEN);
            if start {
                sql.push_str(ATTACHED_FROM);
            }
            if end {
                sql.push_str(ATTACHED_UNTIL);
            }
            sql.push_str(ATTACHED_CLOSE);
        }
        sql.push_str(ELIGIBLE_ORDER);
        sql
    }
}

#[async_trait]
impl MetadataStore for SqlMetadataStore {
    #[instrument(skip(self))]
    async fn list_eligible_handles(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<String>, LookupError> {
        let sql = Self::eligible_sql(start.is_some(), end.is_some());

        let mut query = sqlx::query_scalar::<_, String>(&sql)
            .bind(REPOSITORY_SOURCE)
            .bind(FIELD_TYPE);
        for work_type in EXPORTABLE_TYPES {
            query = query.bind(work_type);
        }
        query = query
            .bind(REPOSITORY_SOURCE)
            .bind(FIELD_COMMUNITY)
            .bind(self.communities[0].as_str())
            .bind(self.communities[1].as_str());
        if start.is_some() || end.is_some() {
            query = query
                .bind(REPOSITORY_SOURCE)
                .bind(FIELD_BITSTREAM_UUID)
                .bind(REPOSITORY_SOURCE)
                .bind(FIELD_BITSTREAM_UUID);
        }
        if let Some(start) = start {
            query = query.bind(start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = end {
            query = query.bind(end.format(DATE_FORMAT).to_string());
        }

        let handles = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LookupError::query("list_eligible_handles", e))?;

        debug!(count = handles.len(), "eligible handles");
        Ok(handles)
    }

    #[instrument(skip(self))]
    async fn list_embargoed_handles(
        &self,
        as_of: NaiveDate,
    ) -> Result<HashSet<String>, LookupError> {
        let handles: Vec<String> = sqlx::query_scalar(EMBARGOED)
            .bind(REPOSITORY_SOURCE)
            .bind(FIELD_EMBARGO)
            .bind(as_of.format(DATE_FORMAT).to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LookupError::query("list_embargoed_handles", e))?;

        debug!(count = handles.len(), "embargoed handles");
        Ok(handles.into_iter().collect())
    }

    async fn get_field_values(
        &self,
        handle: &str,
        field: &str,
    ) -> Result<Vec<String>, LookupError> {
        sqlx::query_scalar(FIELD_VALUES)
            .bind(REPOSITORY_SOURCE)
            .bind(handle)
            .bind(field)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LookupError::query("get_field_values", e))
    }

    #[instrument(skip(self))]
    async fn get_file_identifiers(&self, handle: &str) -> Result<Vec<String>, LookupError> {
        let rows: Vec<(String, String)> = sqlx::query_as(FILE_IDENTIFIERS)
            .bind(REPOSITORY_SOURCE)
            .bind(handle)
            .bind(FIELD_BITSTREAM_UUID)
            .bind(REPOSITORY_SOURCE)
            .bind(FIELD_BITSTREAM_NAME)
            .bind(REPOSITORY_SOURCE)
            .bind(FIELD_BUNDLE_NAME)
            .bind(ORIGINAL_BUNDLE)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LookupError::query("get_file_identifiers", e))?;

        let extension = format!(".{}", self.file_suffix);
        let mut seen = HashSet::new();
        let identifiers: Vec<String> = rows
            .into_iter()
            .filter(|(_, name)| name.ends_with(&extension))
            .map(|(id, _)| id)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        debug!(count = identifiers.len(), "file identifiers");
        Ok(identifiers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SCHEMA: &str = "
        CREATE TABLE metadata (
            rowID INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            idInSource TEXT NOT NULL,
            parentRowID INTEGER,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            added TEXT NOT NULL,
            deleted TEXT
        )";

    const RESEARCH: &str = "10754/324602";
    const ETD: &str = "10754/124545";

    struct Fixture {
        db: Database,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = Database::new_in_memory().await.unwrap();
            sqlx::query(SCHEMA).execute(db.pool()).await.unwrap();
            Self { db }
        }

        fn store(&self) -> SqlMetadataStore {
            SqlMetadataStore::new(&self.db, [RESEARCH.to_string(), ETD.to_string()], "pdf")
        }

        async fn row(
            &self,
            handle: &str,
            parent: Option<i64>,
            field: &str,
            value: &str,
            added: &str,
        ) -> i64 {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO metadata (source, idInSource, parentRowID, field, value, added)
                 VALUES ('repository', ?, ?, ?, ?, ?)
                 RETURNING rowID",
            )
            .bind(handle)
            .bind(parent)
            .bind(field)
            .bind(value)
            .bind(added)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
        }

        async fn delete(&self, row_id: i64) {
            sqlx::query("UPDATE metadata SET deleted = '2024-06-01 00:00:00' WHERE rowID = ?")
                .bind(row_id)
                .execute(self.db.pool())
                .await
                .unwrap();
        }

        /// A typed work in a community.
        async fn work(&self, handle: &str, work_type: &str, community: &str) {
            self.row(handle, None, FIELD_TYPE, work_type, "2020-01-01 00:00:00")
                .await;
            self.row(handle, None, FIELD_COMMUNITY, community, "2020-01-01 00:00:00")
                .await;
        }

        /// A named file in a bundle; returns the identifier row.
        async fn file(&self, handle: &str, bundle: &str, uuid: &str, name: &str, added: &str) -> i64 {
            let bundle_row = self.row(handle, None, FIELD_BUNDLE_NAME, bundle, added).await;
            let uuid_row = self
                .row(handle, Some(bundle_row), FIELD_BITSTREAM_UUID, uuid, added)
                .await;
            self.row(handle, Some(uuid_row), FIELD_BITSTREAM_NAME, name, added)
                .await;
            uuid_row
        }
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, DATE_FORMAT).unwrap()
    }

    #[tokio::test]
    async fn test_eligible_filters_type_and_community() {
        let fx = Fixture::new().await;
        fx.work("10754/1", "Article", RESEARCH).await;
        fx.work("10754/2", "Thesis", ETD).await;
        fx.work("10754/3", "Dataset", RESEARCH).await;
        fx.work("10754/4", "Article", "10754/999").await;

        let handles = fx.store().list_eligible_handles(None, None).await.unwrap();
        assert_eq!(handles, vec!["10754/1", "10754/2"]);
    }

    #[tokio::test]
    async fn test_eligible_ignores_deleted_rows_and_deduplicates() {
        let fx = Fixture::new().await;
        fx.work("10754/1", "Article", RESEARCH).await;
        fx.row("10754/1", None, FIELD_TYPE, "Preprint", "2021-01-01 00:00:00")
            .await;
        let type_row = fx
            .row("10754/2", None, FIELD_TYPE, "Article", "2020-01-01 00:00:00")
            .await;
        fx.row("10754/2", None, FIELD_COMMUNITY, RESEARCH, "2020-01-01 00:00:00")
            .await;
        fx.delete(type_row).await;

        let handles = fx.store().list_eligible_handles(None, None).await.unwrap();
        assert_eq!(handles, vec!["10754/1"]);
    }

    #[tokio::test]
    async fn test_eligible_date_bounds_are_inclusive() {
        let fx = Fixture::new().await;
        for (handle, added) in [
            ("10754/10", "2024-01-09 23:59:59"),
            ("10754/11", "2024-01-10 00:00:01"),
            ("10754/12", "2024-01-20 18:00:00"),
            ("10754/13", "2024-01-21 00:00:00"),
        ] {
            fx.work(handle, "Article", RESEARCH).await;
            fx.file(handle, "ORIGINAL", &format!("uuid-{handle}"), "a.pdf", added)
                .await;
        }
        let store = fx.store();

        let both = store
            .list_eligible_handles(Some(date("2024-01-10")), Some(date("2024-01-20")))
            .await
            .unwrap();
        assert_eq!(both, vec!["10754/11", "10754/12"]);

        let from = store
            .list_eligible_handles(Some(date("2024-01-20")), None)
            .await
            .unwrap();
        assert_eq!(from, vec!["10754/12", "10754/13"]);

        let until = store
            .list_eligible_handles(None, Some(date("2024-01-09")))
            .await
            .unwrap();
        assert_eq!(until, vec!["10754/10"]);
    }

    #[tokio::test]
    async fn test_eligible_uses_earliest_attachment_of_each_file() {
        let fx = Fixture::new().await;
        fx.work("10754/20", "Article", RESEARCH).await;
        fx.file("10754/20", "ORIGINAL", "uuid-old", "a.pdf", "2023-05-01 00:00:00")
            .await;
        // Same file seen again in a later harvest.
        fx.row("10754/20", None, FIELD_BITSTREAM_UUID, "uuid-old", "2024-02-01 00:00:00")
            .await;

        let handles = fx
            .store()
            .list_eligible_handles(Some(date("2024-01-01")), None)
            .await
            .unwrap();
        assert!(handles.is_empty(), "{handles:?}");
    }

    #[tokio::test]
    async fn test_embargoed_includes_release_on_as_of_date() {
        let fx = Fixture::new().await;
        fx.row("10754/1", None, FIELD_EMBARGO, "2024-03-01", "2020-01-01 00:00:00")
            .await;
        fx.row("10754/2", None, FIELD_EMBARGO, "2024-02-29", "2020-01-01 00:00:00")
            .await;
        fx.row("10754/3", None, FIELD_EMBARGO, "2030-01-01", "2020-01-01 00:00:00")
            .await;

        let embargoed = fx
            .store()
            .list_embargoed_handles(date("2024-03-01"))
            .await
            .unwrap();
        assert_eq!(
            embargoed,
            HashSet::from(["10754/1".to_string(), "10754/3".to_string()])
        );
    }

    #[tokio::test]
    async fn test_field_values_in_insertion_order_without_deleted() {
        let fx = Fixture::new().await;
        fx.row("10754/1", None, "dc.contributor.author", "Zed, A.", "2020-01-01 00:00:00")
            .await;
        let gone = fx
            .row("10754/1", None, "dc.contributor.author", "Gone, B.", "2020-01-01 00:00:00")
            .await;
        fx.row("10754/1", None, "dc.contributor.author", "Adams, C.", "2020-01-01 00:00:00")
            .await;
        fx.row("10754/2", None, "dc.contributor.author", "Other, D.", "2020-01-01 00:00:00")
            .await;
        fx.delete(gone).await;

        let values = fx
            .store()
            .get_field_values("10754/1", "dc.contributor.author")
            .await
            .unwrap();
        assert_eq!(values, vec!["Zed, A.", "Adams, C."]);
    }

    #[tokio::test]
    async fn test_file_identifiers_original_bundle_and_suffix_only() {
        let fx = Fixture::new().await;
        let h = "10754/1";
        fx.file(h, "ORIGINAL", "uuid-1", "paper.pdf", "2024-01-01 00:00:00")
            .await;
        fx.file(h, "THUMBNAIL", "uuid-2", "paper.pdf.jpg", "2024-01-01 00:00:00")
            .await;
        fx.file(h, "LICENSE", "uuid-3", "license.pdf", "2024-01-01 00:00:00")
            .await;
        fx.file(h, "ORIGINAL", "uuid-4", "SCAN.PDF", "2024-01-01 00:00:00")
            .await;
        fx.file(h, "ORIGINAL", "uuid-5", "data.csv", "2024-01-01 00:00:00")
            .await;
        fx.file(h, "ORIGINAL", "uuid-6", "supplement.pdf", "2024-01-02 00:00:00")
            .await;
        let withdrawn = fx
            .file(h, "ORIGINAL", "uuid-7", "withdrawn.pdf", "2024-01-03 00:00:00")
            .await;
        fx.delete(withdrawn).await;

        let ids = fx.store().get_file_identifiers(h).await.unwrap();
        assert_eq!(ids, vec!["uuid-1", "uuid-6"]);
    }

    #[tokio::test]
    async fn test_query_failure_is_lookup_error() {
        let fx = Fixture::new().await;
        sqlx::query("DROP TABLE metadata")
            .execute(fx.db.pool())
            .await
            .unwrap();

        let result = fx.store().get_file_identifiers("10754/1").await;
        assert!(
            matches!(
                result,
                Err(LookupError::Query {
                    operation: "get_file_identifiers",
                    ..
                })
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_eligible_sql_binds_every_bound() {
        let plain = SqlMetadataStore::eligible_sql(false, false);
        assert_eq!(plain.matches('?').count(), 2 + EXPORTABLE_TYPES.len() + 4);
        assert!(!plain.contains("MIN(`added`)"));

        let both = SqlMetadataStore::eligible_sql(true, true);
        assert_eq!(both.matches('?').count(), 2 + EXPORTABLE_TYPES.len() + 4 + 4 + 2);
    }
}
