//! Diff events and normalized rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::NULL_TOKEN;

/// A fetched row after normalization: the key and one value per compared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: i64,
    pub values: Vec<Option<String>>,
}

impl Row {
    pub fn new(key: i64, values: Vec<Option<String>>) -> Self {
        Self { key, values }
    }
}

/// What happened to a key between the first and second table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Present only in the second table.
    Added,
    /// Present only in the first table.
    Removed,
    /// Present in both with different values.
    Changed,
}

impl DiffKind {
    pub fn symbol(&self) -> char {
        match self {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Changed => '~',
        }
    }
}

/// One differing key, carrying the normalized values of the side(s) it exists on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEvent {
    pub kind: DiffKind,
    pub key: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<Vec<Option<String>>>,
}

impl DiffEvent {
    pub fn added(row: Row) -> Self {
        Self {
            kind: DiffKind::Added,
            key: row.key,
            a: None,
            b: Some(row.values),
        }
    }

    pub fn removed(row: Row) -> Self {
        Self {
            kind: DiffKind::Removed,
            key: row.key,
            a: Some(row.values),
            b: None,
        }
    }

    pub fn changed(a: Row, b: Row) -> Self {
        Self {
            kind: DiffKind::Changed,
            key: a.key,
            a: Some(a.values),
            b: Some(b.values),
        }
    }
}

struct Values<'a>(&'a [Option<String>]);

impl fmt::Display for Values<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(value.as_deref().unwrap_or(NULL_TOKEN))?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for DiffEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.symbol(), self.key)?;
        match (&self.a, &self.b) {
            (Some(a), Some(b)) => write!(f, " {} -> {}", Values(a), Values(b)),
            (Some(values), None) | (None, Some(values)) => write!(f, " {}", Values(values)),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: i64, values: &[Option<&str>]) -> Row {
        Row::new(key, values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DiffEvent::added(row(4, &[Some("10"), None])).to_string(),
            "+ 4 (10, NULL)"
        );
        assert_eq!(DiffEvent::removed(row(5, &[])).to_string(), "- 5 ()");
        assert_eq!(
            DiffEvent::changed(row(6, &[Some("a")]), row(6, &[Some("b")])).to_string(),
            "~ 6 (a) -> (b)"
        );
    }

    #[test]
    fn test_json_shape() {
        let event = DiffEvent::removed(row(7, &[Some("x"), None]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "removed", "key": 7, "a": ["x", null]})
        );
    }
}
