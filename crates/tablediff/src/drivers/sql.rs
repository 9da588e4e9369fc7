//! [`Database`] implementation shared by every SQL engine.
//!
//! Query text comes from the connection's [`Dialect`]; round-trips go through
//! an engine-specific [`SqlExecutor`].

use async_trait::async_trait;
use tracing::trace;

use crate::checksum::SegmentDigest;
use crate::core::traits::{cell_opt_i64, cell_u64};
use crate::core::{
    ColumnInfo, ColumnType, Database, KeyBounds, RawRow, Scan, SqlExecutor, SqlValue, TablePath,
    TypeCategory,
};
use crate::dialect::{Dialect, DialectImpl, DialectKind};
use crate::error::{DiffError, Result};

const DESCRIBE_KINDS: &[TypeCategory] = &[
    TypeCategory::Text,
    TypeCategory::Text,
    TypeCategory::Integer,
    TypeCategory::Integer,
    TypeCategory::Integer,
];

/// A SQL engine: dialect for query text plus an executor for round-trips.
pub struct SqlDatabase<E> {
    executor: E,
    dialect: DialectImpl,
    name: String,
}

impl<E: SqlExecutor> SqlDatabase<E> {
    pub fn new(executor: E, dialect: DialectImpl, name: impl Into<String>) -> Self {
        Self {
            executor,
            dialect,
            name: name.into(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn query(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<Vec<SqlValue>>> {
        trace!(database = %self.name, %sql, "query");
        self.executor.execute(sql, kinds).await
    }

    async fn query_one(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<SqlValue>> {
        self.query(sql, kinds)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DiffError::query(&self.name, "aggregate query returned no rows"))
    }
}

#[async_trait]
impl<E: SqlExecutor> Database for SqlDatabase<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> DialectKind {
        self.dialect.kind()
    }

    async fn describe_table(&self, table: &TablePath) -> Result<Vec<ColumnInfo>> {
        let sql = self.dialect.build_describe(table)?;
        let rows = self.query(&sql, DESCRIBE_KINDS).await?;
        if rows.is_empty() {
            return Err(DiffError::Config(format!(
                "Table {} not found on {}",
                table, self.name
            )));
        }

        rows.iter()
            .map(|row| {
                let text = |i: usize| -> Result<&str> {
                    row.get(i).and_then(SqlValue::as_str).ok_or_else(|| {
                        DiffError::query(&self.name, format!("catalog column {} is not text", i))
                    })
                };
                let int = |i: usize| -> Result<Option<u32>> {
                    let value = row.get(i).unwrap_or(&SqlValue::Null);
                    Ok(cell_opt_i64(&self.name, value)?.map(|v| v.max(0) as u32))
                };

                let numeric_precision = int(2)?;
                let numeric_scale = int(3)?;
                let datetime_precision = int(4)?;
                Ok(ColumnInfo::new(
                    text(0)?,
                    ColumnType::new(
                        text(1)?,
                        datetime_precision.or(numeric_precision),
                        numeric_scale,
                    ),
                ))
            })
            .collect()
    }

    async fn count(&self, scan: &Scan<'_>) -> Result<u64> {
        let sql = self.dialect.build_count(scan)?;
        let row = self.query_one(&sql, &[TypeCategory::Integer]).await?;
        cell_u64(&self.name, &row[0])
    }

    async fn count_and_checksum(&self, scan: &Scan<'_>) -> Result<SegmentDigest> {
        let sql = self.dialect.build_count_and_checksum(scan)?;
        let row = self
            .query_one(&sql, &[TypeCategory::Integer, TypeCategory::Integer])
            .await?;
        Ok(SegmentDigest {
            count: cell_u64(&self.name, &row[0])?,
            checksum: cell_u64(&self.name, &row[1])?,
        })
    }

    async fn key_bounds(&self, scan: &Scan<'_>) -> Result<KeyBounds> {
        let sql = self.dialect.build_key_bounds(scan)?;
        let row = self.query_one(&sql, &[TypeCategory::Integer; 3]).await?;
        Ok(KeyBounds {
            min: cell_opt_i64(&self.name, &row[0])?,
            max: cell_opt_i64(&self.name, &row[1])?,
            count: cell_u64(&self.name, &row[2])?,
        })
    }

    async fn fetch_rows(&self, scan: &Scan<'_>, limit: Option<usize>) -> Result<Vec<RawRow>> {
        let sql = self.dialect.build_fetch_rows(scan, limit)?;
        let kinds: Vec<TypeCategory> = std::iter::once(TypeCategory::Integer)
            .chain(scan.columns.iter().map(|c| c.rule.category()))
            .collect();

        self.query(&sql, &kinds)
            .await?
            .into_iter()
            .map(|mut row| {
                let values = row.split_off(1);
                let key = cell_opt_i64(&self.name, &row[0])?.ok_or_else(|| {
                    DiffError::query(&self.name, format!("NULL value in key column {}", scan.key))
                })?;
                Ok(RawRow { key, values })
            })
            .collect()
    }

    async fn sample_keys(&self, scan: &Scan<'_>, limit: usize) -> Result<Vec<i64>> {
        let sql = self.dialect.build_sample_keys(scan, limit)?;
        self.query(&sql, &[TypeCategory::Integer])
            .await?
            .iter()
            .filter_map(|row| cell_opt_i64(&self.name, &row[0]).transpose())
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    async fn close(&self) {
        self.executor.close().await;
    }
}
