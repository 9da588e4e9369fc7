//! Key ranges and table paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};

/// Half-open integer key interval `[start, end)`.
///
/// `end` is wider than a key so a range can include `i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: i64,
    pub end: i128,
}

impl KeyRange {
    /// Create a range, rejecting `start > end` and ends past `i64::MAX + 1`.
    pub fn new(start: i64, end: i128) -> Result<Self> {
        if (start as i128) > end {
            return Err(DiffError::Config(format!(
                "Invalid key range [{}, {}): start is greater than end",
                start, end
            )));
        }
        if end > KEY_DOMAIN_END {
            return Err(DiffError::Config(format!(
                "Invalid key range [{}, {}): end lies past the largest key",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering the inclusive bounds `[min, max]` discovered on a table.
    pub fn from_inclusive(min: i64, max: i64) -> Result<Self> {
        Self::new(min, max as i128 + 1)
    }

    /// Number of possible key values in the range.
    pub fn width(&self) -> i128 {
        self.end - self.start as i128
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.start && (key as i128) < self.end
    }

    /// Exclusive upper bound as a key, `None` when the range runs to `i64::MAX`.
    pub fn end_key(&self) -> Option<i64> {
        i64::try_from(self.end).ok()
    }

    /// Smallest range covering both inputs.
    pub fn union(&self, other: &KeyRange) -> KeyRange {
        KeyRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The part of this range at or after `key`.
    pub fn starting_at(&self, key: i64) -> KeyRange {
        if (key as i128) >= self.end {
            // A key at or past `end` means `end` fits in a key.
            return KeyRange {
                start: self.end as i64,
                end: self.end,
            };
        }
        KeyRange {
            start: key.max(self.start),
            end: self.end,
        }
    }
}

/// Exclusive end of a range reaching the largest key.
const KEY_DOMAIN_END: i128 = i64::MAX as i128 + 1;

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Schema-qualified table name.
///
/// The schema is optional; adapters fall back to the connection's default
/// schema (`current_schema()`, `DATABASE()`, `SCHEMA_NAME()`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePath {
    pub schema: Option<String>,
    pub table: String,
}

impl TablePath {
    pub fn new(schema: Option<&str>, table: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        }
    }

    /// Parse `table` or `schema.table`.
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            [table] if !table.is_empty() => Ok(Self::new(None, table)),
            [schema, table] if !schema.is_empty() && !table.is_empty() => {
                Ok(Self::new(Some(schema), table))
            }
            _ => Err(DiffError::Config(format!(
                "Invalid table path '{}': expected 'table' or 'schema.table'",
                path
            ))),
        }
    }
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_new_rejects_inverted() {
        assert!(KeyRange::new(5, 4).is_err());
        assert!(KeyRange::new(5, 5).unwrap().is_empty());
    }

    #[test]
    fn test_key_range_from_inclusive() {
        assert_eq!(KeyRange::from_inclusive(1, 6).unwrap(), KeyRange { start: 1, end: 7 });
        let top = KeyRange::from_inclusive(1, i64::MAX).unwrap();
        assert!(top.contains(i64::MAX));
        assert_eq!(top.end_key(), None);
        assert_eq!(top.width(), i64::MAX as i128);
        assert!(KeyRange::new(0, i64::MAX as i128 + 2).is_err());
    }

    #[test]
    fn test_key_range_width_full_domain() {
        let range = KeyRange::from_inclusive(i64::MIN, i64::MAX).unwrap();
        assert_eq!(range.width(), u64::MAX as i128 + 1);
    }

    #[test]
    fn test_key_range_union_and_contains() {
        let a = KeyRange::new(1, 5).unwrap();
        let b = KeyRange::new(3, 10).unwrap();
        let u = a.union(&b);
        assert_eq!(u, KeyRange { start: 1, end: 10 });
        assert!(u.contains(1));
        assert!(!u.contains(10));
        assert_eq!(u.starting_at(4), KeyRange { start: 4, end: 10 });
        assert_eq!(u.starting_at(20), KeyRange { start: 10, end: 10 });
    }

    #[test]
    fn test_table_path_parse() {
        assert_eq!(TablePath::parse("orders").unwrap(), TablePath::new(None, "orders"));
        let path = TablePath::parse("sales.orders").unwrap();
        assert_eq!(path.schema.as_deref(), Some("sales"));
        assert_eq!(path.to_string(), "sales.orders");
        assert!(TablePath::parse("a.b.c").is_err());
        assert!(TablePath::parse(".orders").is_err());
    }
}
