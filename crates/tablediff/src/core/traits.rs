//! Core traits implemented by database adapters.
//!
//! - [`Database`]: the structured operations the diff engine needs from one connection
//! - [`SqlExecutor`]: raw SQL round-trips, wrapped by
//!   [`SqlDatabase`](crate::drivers::SqlDatabase) for real engines
//!
//! Engines backed by SQL implement only [`SqlExecutor`]; the query text comes
//! from their [`Dialect`](crate::dialect::Dialect). The in-memory adapter
//! implements [`Database`] directly.

use async_trait::async_trait;

use crate::checksum::SegmentDigest;
use crate::dialect::DialectKind;
use crate::error::{DiffError, Result};
use crate::normalize::ColumnPlan;

use super::key::{KeyRange, TablePath};
use super::schema::{ColumnInfo, TypeCategory};
use super::value::{RawRow, SqlValue};

/// The slice of one table a query runs over.
#[derive(Debug, Clone, Copy)]
pub struct Scan<'a> {
    pub table: &'a TablePath,
    pub key: &'a str,
    pub columns: &'a [ColumnPlan],
    /// `None` scans the whole table.
    pub range: Option<KeyRange>,
}

/// Result of a min/max discovery query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyBounds {
    pub count: u64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl KeyBounds {
    /// Half-open range covering the discovered keys, `None` for an empty table.
    pub fn range(&self) -> Result<Option<KeyRange>> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => KeyRange::from_inclusive(min, max).map(Some),
            _ => Ok(None),
        }
    }
}

/// Operations the diff engine issues against one database connection.
///
/// Every method is a single read-only round-trip.
#[async_trait]
pub trait Database: Send + Sync {
    /// Display name used in logs and errors (e.g. `postgres://host/db`).
    fn name(&self) -> &str;

    /// Dialect used to resolve column types through the registry.
    fn dialect(&self) -> DialectKind;

    /// Columns of a table in ordinal order.
    async fn describe_table(&self, table: &TablePath) -> Result<Vec<ColumnInfo>>;

    async fn count(&self, scan: &Scan<'_>) -> Result<u64>;

    async fn count_and_checksum(&self, scan: &Scan<'_>) -> Result<SegmentDigest>;

    async fn key_bounds(&self, scan: &Scan<'_>) -> Result<KeyBounds>;

    /// Rows ordered by key: the key then each planned column, raw.
    async fn fetch_rows(&self, scan: &Scan<'_>, limit: Option<usize>) -> Result<Vec<RawRow>>;

    /// Distinct keys in ascending order, at most `limit` of them.
    async fn sample_keys(&self, scan: &Scan<'_>, limit: usize) -> Result<Vec<i64>>;

    /// Cheap round-trip to verify connectivity.
    async fn ping(&self) -> Result<()>;

    /// Close pooled connections.
    async fn close(&self) {}
}

/// Executes SQL text and decodes result columns by type category.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run `sql` and decode each result column according to `kinds`.
    async fn execute(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<Vec<SqlValue>>>;

    async fn close(&self) {}
}

/// Read a non-negative integer cell.
pub(crate) fn cell_u64(database: &str, value: &SqlValue) -> Result<u64> {
    match value {
        SqlValue::I64(v) if *v >= 0 => Ok(*v as u64),
        SqlValue::Null => Ok(0),
        other => Err(DiffError::query(
            database,
            format!("expected a non-negative integer, got {:?}", other),
        )),
    }
}

/// Read an optional integer cell.
pub(crate) fn cell_opt_i64(database: &str, value: &SqlValue) -> Result<Option<i64>> {
    match value {
        SqlValue::I64(v) => Ok(Some(*v)),
        SqlValue::Null => Ok(None),
        other => Err(DiffError::query(
            database,
            format!("expected an integer, got {:?}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bounds_range() {
        let bounds = KeyBounds {
            count: 6,
            min: Some(1),
            max: Some(6),
        };
        assert_eq!(bounds.range().unwrap(), Some(KeyRange { start: 1, end: 7 }));
        assert_eq!(KeyBounds::default().range().unwrap(), None);
    }

    #[test]
    fn test_key_bounds_max_key_is_config_error() {
        let bounds = KeyBounds {
            count: 1,
            min: Some(i64::MAX),
            max: Some(i64::MAX),
        };
        assert!(matches!(bounds.range(), Err(DiffError::Config(_))));
    }

    #[test]
    fn test_cells() {
        assert_eq!(cell_u64("db", &SqlValue::I64(3)).unwrap(), 3);
        assert_eq!(cell_u64("db", &SqlValue::Null).unwrap(), 0);
        assert!(cell_u64("db", &SqlValue::I64(-1)).is_err());
        assert_eq!(cell_opt_i64("db", &SqlValue::Null).unwrap(), None);
        assert!(cell_opt_i64("db", &SqlValue::from("x")).is_err());
    }
}
