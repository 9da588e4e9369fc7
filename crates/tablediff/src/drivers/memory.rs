//! In-memory [`Database`] for tests and dry runs.
//!
//! Tables hold raw [`SqlValue`]s under declared type names, so the registry
//! and negotiation run exactly as they do for a real engine. Checksums are
//! computed in process with the same row encoding the SQL dialects push down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::checksum::{digest_rows, SegmentDigest};
use crate::core::{
    ColumnInfo, ColumnType, Database, KeyBounds, RawRow, Scan, SqlValue, TablePath,
};
use crate::dialect::DialectKind;
use crate::error::{DiffError, Result};
use crate::normalize::SegmentPlan;

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    fn column_index(&self, db: &str, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DiffError::query(db, format!("column \"{}\" does not exist", name)))
    }
}

/// A database living in process memory.
pub struct MemoryDatabase {
    name: String,
    dialect: DialectKind,
    tables: RwLock<HashMap<TablePath, MemoryTable>>,
    log: Mutex<Vec<&'static str>>,
    fail_after: AtomicU64,
}

impl MemoryDatabase {
    /// Empty database reporting the given dialect for type resolution.
    pub fn new(name: impl Into<String>, dialect: DialectKind) -> Self {
        Self {
            name: name.into(),
            dialect,
            tables: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            fail_after: AtomicU64::new(u64::MAX),
        }
    }

    /// Create (or replace) a table from `(column, declared type)` pairs.
    pub fn create_table(&self, table: &TablePath, columns: &[(&str, &str)]) {
        let columns = columns
            .iter()
            .map(|(name, decl)| ColumnInfo::new(name, ColumnType::parse(decl)))
            .collect();
        self.write_tables().insert(
            table.clone(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Append one row; values follow the table's column order.
    pub fn insert(&self, table: &TablePath, values: Vec<SqlValue>) -> Result<()> {
        let mut tables = self.write_tables();
        let t = tables.get_mut(table).ok_or_else(|| self.missing(table))?;
        if values.len() != t.columns.len() {
            return Err(DiffError::Config(format!(
                "{} has {} columns, got {} values",
                table,
                t.columns.len(),
                values.len()
            )));
        }
        t.rows.push(values);
        Ok(())
    }

    pub fn insert_rows(
        &self,
        table: &TablePath,
        rows: impl IntoIterator<Item = Vec<SqlValue>>,
    ) -> Result<()> {
        for row in rows {
            self.insert(table, row)?;
        }
        Ok(())
    }

    /// Set `column` on every row whose `key_column` equals `key`. Returns rows touched.
    pub fn update(
        &self,
        table: &TablePath,
        key_column: &str,
        key: i64,
        column: &str,
        value: SqlValue,
    ) -> Result<usize> {
        let mut tables = self.write_tables();
        let t = tables.get_mut(table).ok_or_else(|| self.missing(table))?;
        let k = t.column_index(&self.name, key_column)?;
        let c = t.column_index(&self.name, column)?;
        let mut touched = 0;
        for row in t.rows.iter_mut().filter(|r| r[k].as_i64() == Some(key)) {
            row[c] = value.clone();
            touched += 1;
        }
        Ok(touched)
    }

    /// Remove every row whose `key_column` equals `key`. Returns rows removed.
    pub fn delete(&self, table: &TablePath, key_column: &str, key: i64) -> Result<usize> {
        let mut tables = self.write_tables();
        let t = tables.get_mut(table).ok_or_else(|| self.missing(table))?;
        let k = t.column_index(&self.name, key_column)?;
        let before = t.rows.len();
        t.rows.retain(|r| r[k].as_i64() != Some(key));
        Ok(before - t.rows.len())
    }

    /// Fail every operation after the next `n` with a query error.
    pub fn fail_after(&self, n: u64) {
        let issued = self.queries_issued();
        self.fail_after
            .store(issued.saturating_add(n), Ordering::SeqCst);
    }

    /// Operations issued so far, `ping` excluded.
    pub fn queries_issued(&self) -> u64 {
        self.log_guard().len() as u64
    }

    /// Names of the operations issued so far, in order.
    pub fn query_log(&self) -> Vec<&'static str> {
        self.log_guard().clone()
    }

    fn log_guard(&self) -> std::sync::MutexGuard<'_, Vec<&'static str>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_tables(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TablePath, MemoryTable>> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn missing(&self, table: &TablePath) -> DiffError {
        DiffError::Config(format!("Table {} not found on {}", table, self.name))
    }

    /// Record an operation, failing it if the injected budget is spent.
    fn record(&self, operation: &'static str) -> Result<()> {
        let mut log = self.log_guard();
        if log.len() as u64 >= self.fail_after.load(Ordering::SeqCst) {
            return Err(DiffError::query(
                &self.name,
                format!("injected failure on {}", operation),
            ));
        }
        log.push(operation);
        Ok(())
    }

    /// Rows of a scan as raw rows ordered by key; NULL keys never match a range.
    fn scan_rows(&self, scan: &Scan<'_>) -> Result<Vec<RawRow>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let t = tables.get(scan.table).ok_or_else(|| self.missing(scan.table))?;
        let k = t.column_index(&self.name, scan.key)?;
        let indexes = scan
            .columns
            .iter()
            .map(|c| t.column_index(&self.name, &c.name))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        for row in &t.rows {
            let key = match &row[k] {
                SqlValue::Null => continue,
                SqlValue::I64(v) => *v,
                other => {
                    return Err(DiffError::query(
                        &self.name,
                        format!("key column {} holds a {} value", scan.key, other.kind_name()),
                    ))
                }
            };
            if scan.range.map_or(true, |r| r.contains(key)) {
                rows.push(RawRow {
                    key,
                    values: indexes.iter().map(|&i| row[i].clone()).collect(),
                });
            }
        }
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    async fn describe_table(&self, table: &TablePath) -> Result<Vec<ColumnInfo>> {
        self.record("describe_table")?;
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| self.missing(table))
    }

    async fn count(&self, scan: &Scan<'_>) -> Result<u64> {
        self.record("count")?;
        Ok(self.scan_rows(scan)?.len() as u64)
    }

    async fn count_and_checksum(&self, scan: &Scan<'_>) -> Result<SegmentDigest> {
        self.record("count_and_checksum")?;
        let rows = self.scan_rows(scan)?;
        digest_rows(&SegmentPlan::new(scan.columns.to_vec()), &rows)
    }

    async fn key_bounds(&self, scan: &Scan<'_>) -> Result<KeyBounds> {
        self.record("key_bounds")?;
        let rows = self.scan_rows(scan)?;
        Ok(KeyBounds {
            count: rows.len() as u64,
            min: rows.first().map(|r| r.key),
            max: rows.last().map(|r| r.key),
        })
    }

    async fn fetch_rows(&self, scan: &Scan<'_>, limit: Option<usize>) -> Result<Vec<RawRow>> {
        self.record("fetch_rows")?;
        let mut rows = self.scan_rows(scan)?;
        if let Some(n) = limit {
            rows.truncate(n);
        }
        Ok(rows)
    }

    async fn sample_keys(&self, scan: &Scan<'_>, limit: usize) -> Result<Vec<i64>> {
        self.record("sample_keys")?;
        let mut keys: Vec<i64> = self.scan_rows(scan)?.iter().map(|r| r.key).collect();
        keys.dedup();
        keys.truncate(limit);
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
