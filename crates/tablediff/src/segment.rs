//! A bounded view of one table on one connection.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::checksum::{normalize_row, SegmentDigest};
use crate::core::identifier::validate_identifier;
use crate::core::{ColumnInfo, Database, KeyBounds, KeyRange, Scan, TablePath, TypeCategory};
use crate::diff::Row;
use crate::error::{DiffError, Result};
use crate::normalize::{NormalizationRegistry, SegmentPlan, DEFAULT_TIMESTAMP_PRECISION};
use crate::split::split_range;

/// Catalog entries for a segment's key and compared columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSchema {
    pub key: ColumnInfo,
    pub columns: Vec<ColumnInfo>,
}

/// `(connection, table, key column, key range, compared columns)`.
///
/// Cheap to clone: the connection and plan are shared. A segment never owns
/// its connection.
#[derive(Clone)]
pub struct TableSegment {
    database: Arc<dyn Database>,
    table: TablePath,
    key_column: String,
    range: Option<KeyRange>,
    columns: Vec<String>,
    plan: Option<Arc<SegmentPlan>>,
}

impl TableSegment {
    /// Build a segment; `range` of `None` covers the whole table.
    ///
    /// # Errors
    ///
    /// `DiffError::Config` for an invalid identifier, a compared column equal
    /// to the key, a duplicated column, or a range with `start > end`.
    pub fn new(
        database: Arc<dyn Database>,
        table: TablePath,
        key_column: impl Into<String>,
        range: Option<KeyRange>,
        columns: Vec<String>,
    ) -> Result<Self> {
        let key_column = key_column.into();
        validate_identifier(&key_column)?;

        let mut seen = HashSet::new();
        for column in &columns {
            validate_identifier(column)?;
            if *column == key_column {
                return Err(DiffError::Config(format!(
                    "Compared columns of {} must not include the key column '{}'",
                    table, key_column
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(DiffError::Config(format!(
                    "Column '{}' is listed more than once for {}",
                    column, table
                )));
            }
        }

        if let Some(r) = range {
            KeyRange::new(r.start, r.end)?;
        }

        Ok(Self {
            database,
            table,
            key_column,
            range,
            columns,
            plan: None,
        })
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn table(&self) -> &TablePath {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn range(&self) -> Option<KeyRange> {
        self.range
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn plan(&self) -> Option<&SegmentPlan> {
        self.plan.as_deref()
    }

    /// Same table and columns restricted to `range`.
    pub fn with_range(&self, range: KeyRange) -> Self {
        Self {
            range: Some(range),
            ..self.clone()
        }
    }

    /// Attach resolved rules; queries then use the plan's column names.
    pub fn with_plan(self, plan: Arc<SegmentPlan>) -> Self {
        Self {
            plan: Some(plan),
            ..self
        }
    }

    pub(crate) fn with_key_column(self, key_column: String) -> Self {
        Self { key_column, ..self }
    }

    /// Look up the key and compared columns in the catalog.
    ///
    /// Names match exactly first, then case-insensitively.
    pub async fn describe(&self) -> Result<SegmentSchema> {
        let catalog = self.database.describe_table(&self.table).await?;
        let find = |name: &str| -> Result<ColumnInfo> {
            catalog
                .iter()
                .find(|c| c.name == name)
                .or_else(|| catalog.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
                .cloned()
                .ok_or_else(|| {
                    DiffError::Config(format!(
                        "Column '{}' not found in {} on {}",
                        name,
                        self.table,
                        self.database.name()
                    ))
                })
        };

        Ok(SegmentSchema {
            key: find(self.key_column.as_str())?,
            columns: self
                .columns
                .iter()
                .map(|c| find(c.as_str()))
                .collect::<Result<_>>()?,
        })
    }

    /// Resolve this side's rules on its own, without negotiating with another table.
    pub async fn resolve_plan(
        &self,
        registry: &NormalizationRegistry,
        default_precision: u32,
    ) -> Result<SegmentPlan> {
        let schema = self.describe().await?;
        check_key(registry, self.database.as_ref(), &schema.key)?;
        SegmentPlan::resolve(
            registry,
            self.database.dialect(),
            &schema.columns,
            default_precision,
        )
    }

    async fn ensure_plan(&self) -> Result<Arc<SegmentPlan>> {
        match &self.plan {
            Some(plan) => Ok(Arc::clone(plan)),
            None => Ok(Arc::new(
                self.resolve_plan(
                    &NormalizationRegistry::builtin(),
                    DEFAULT_TIMESTAMP_PRECISION,
                )
                .await?,
            )),
        }
    }

    fn scan<'a>(&'a self, plan: &'a SegmentPlan) -> Scan<'a> {
        Scan {
            table: &self.table,
            key: &self.key_column,
            columns: &plan.columns,
            range: self.range,
        }
    }

    pub async fn count(&self) -> Result<u64> {
        let scan = Scan {
            table: &self.table,
            key: &self.key_column,
            columns: &[],
            range: self.range,
        };
        self.database.count(&scan).await
    }

    pub async fn checksum(&self) -> Result<u64> {
        Ok(self.count_and_checksum().await?.checksum)
    }

    pub async fn count_and_checksum(&self) -> Result<SegmentDigest> {
        let plan = self.ensure_plan().await?;
        self.database.count_and_checksum(&self.scan(&plan)).await
    }

    pub async fn key_bounds(&self) -> Result<KeyBounds> {
        let scan = Scan {
            table: &self.table,
            key: &self.key_column,
            columns: &[],
            range: self.range,
        };
        self.database.key_bounds(&scan).await
    }

    /// Rows in key order, normalized by the plan.
    pub async fn fetch_rows(&self, limit: Option<usize>) -> Result<Vec<Row>> {
        let plan = self.ensure_plan().await?;
        let raw = self.database.fetch_rows(&self.scan(&plan), limit).await?;
        raw.iter()
            .map(|r| Ok(Row::new(r.key, normalize_row(&plan, r)?)))
            .collect()
    }

    /// Up to `limit` distinct keys in ascending order.
    pub async fn sample_keys(&self, limit: usize) -> Result<Vec<i64>> {
        let scan = Scan {
            table: &self.table,
            key: &self.key_column,
            columns: &[],
            range: self.range,
        };
        self.database.sample_keys(&scan, limit).await
    }

    /// Child segments covering this segment's range.
    pub fn split(&self, parts: usize) -> Result<Vec<TableSegment>> {
        let range = self.range.ok_or_else(|| {
            DiffError::Config(format!(
                "Cannot split unbounded segment of {}; resolve its key bounds first",
                self.table
            ))
        })?;
        Ok(split_range(range, parts)
            .into_iter()
            .map(|r| self.with_range(r))
            .collect())
    }
}

impl fmt::Debug for TableSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSegment")
            .field("database", &self.database.name())
            .field("table", &self.table)
            .field("key_column", &self.key_column)
            .field("range", &self.range)
            .field("columns", &self.columns)
            .finish()
    }
}

impl fmt::Display for TableSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.table, self.database.name())?;
        if let Some(range) = self.range {
            write!(f, " {}", range)?;
        }
        Ok(())
    }
}

/// Keys must resolve to the integer category.
pub(crate) fn check_key(
    registry: &NormalizationRegistry,
    database: &dyn Database,
    key: &ColumnInfo,
) -> Result<()> {
    let category = registry.require(database.dialect(), &key.data_type, &key.name)?;
    if category != TypeCategory::Integer {
        return Err(DiffError::Config(format!(
            "Key column '{}' has type '{}' on {}; keys must be integer columns",
            key.name,
            key.data_type,
            database.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::dialect::DialectKind;
    use crate::drivers::MemoryDatabase;

    fn memory() -> Arc<MemoryDatabase> {
        let db = MemoryDatabase::new("memory://seg", DialectKind::Mysql);
        let t = TablePath::new(None, "items");
        db.create_table(&t, &[("ID", "int"), ("Price", "decimal(10,2)"), ("tag", "float")]);
        db.insert_rows(
            &t,
            (1..=10).map(|k| {
                vec![
                    SqlValue::I64(k),
                    SqlValue::Decimal(rust_decimal::Decimal::new(k * 105, 1)),
                    SqlValue::Null,
                ]
            }),
        )
        .unwrap();
        Arc::new(db)
    }

    fn segment(db: Arc<MemoryDatabase>, columns: &[&str]) -> Result<TableSegment> {
        TableSegment::new(
            db,
            TablePath::new(None, "items"),
            "ID",
            None,
            columns.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn test_new_rejects_key_in_columns_and_duplicates() {
        assert!(segment(memory(), &["ID"]).is_err());
        assert!(segment(memory(), &["Price", "Price"]).is_err());
        assert!(segment(memory(), &["bad\0name"]).is_err());
        assert!(segment(memory(), &[""]).is_err());
        let bad_range = TableSegment::new(
            memory(),
            TablePath::new(None, "items"),
            "ID",
            Some(KeyRange { start: 5, end: 1 }),
            vec![],
        );
        assert!(matches!(bad_range, Err(DiffError::Config(_))));
    }

    #[tokio::test]
    async fn test_describe_matches_case_insensitively() {
        let seg = segment(memory(), &["price"]).unwrap();
        let schema = seg.describe().await.unwrap();
        assert_eq!(schema.key.name, "ID");
        assert_eq!(schema.columns[0].name, "Price");
        assert_eq!(schema.columns[0].data_type.scale, Some(2));
    }

    #[tokio::test]
    async fn test_count_checksum_and_fetch() {
        let seg = segment(memory(), &["Price"])
            .unwrap()
            .with_range(KeyRange { start: 3, end: 6 });
        assert_eq!(seg.count().await.unwrap(), 3);
        let digest = seg.count_and_checksum().await.unwrap();
        assert_eq!(digest.count, 3);
        assert_eq!(seg.checksum().await.unwrap(), digest.checksum);

        let rows = seg.fetch_rows(Some(2)).await.unwrap();
        assert_eq!(rows[0], Row::new(3, vec![Some("31.50".to_string())]));
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_type_is_config_error() {
        let seg = segment(memory(), &["tag"]).unwrap();
        let err = seg.checksum().await.unwrap_err();
        assert!(matches!(err, DiffError::Config(_)));
        assert!(err.to_string().contains("tag"));
    }

    #[tokio::test]
    async fn test_split_requires_bounds() {
        let seg = segment(memory(), &[]).unwrap();
        assert!(seg.split(2).is_err());

        let bounds = seg.key_bounds().await.unwrap();
        let range = bounds.range().unwrap().unwrap();
        let children = seg.with_range(range).split(3).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].range(), Some(KeyRange { start: 1, end: 4 }));
        assert_eq!(children[2].range(), Some(KeyRange { start: 7, end: 11 }));
        let counts: u64 = futures::future::try_join_all(children.iter().map(|c| c.count()))
            .await
            .unwrap()
            .iter()
            .sum();
        assert_eq!(counts, 10);
    }
}
