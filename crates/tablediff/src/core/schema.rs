//! Column metadata and type vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Engine-independent category a column type normalizes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Integer,
    Decimal,
    Timestamp,
    Boolean,
    Uuid,
    Text,
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeCategory::Integer => "integer",
            TypeCategory::Decimal => "decimal",
            TypeCategory::Timestamp => "timestamp",
            TypeCategory::Boolean => "boolean",
            TypeCategory::Uuid => "uuid",
            TypeCategory::Text => "text",
        };
        f.write_str(name)
    }
}

/// A declared column type: base name plus optional precision and scale.
///
/// `precision` is the fractional-second precision for temporal types and the
/// total digit count for exact numerics; `scale` is the numeric scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    pub name: String,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnType {
    pub fn new(name: &str, precision: Option<u32>, scale: Option<u32>) -> Self {
        Self {
            name: normalize_type_name(name),
            precision,
            scale,
        }
    }

    /// Parse a declaration such as `numeric(10,2)` or `timestamp(3) without time zone`.
    ///
    /// The name is lowercased with parameters removed and whitespace collapsed.
    /// Unparseable parameters (e.g. `varchar(max)`) are ignored.
    pub fn parse(declaration: &str) -> Self {
        let mut name = String::with_capacity(declaration.len());
        let mut params = String::new();
        let mut depth = 0usize;
        for ch in declaration.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if depth > 0 => params.push(ch),
                _ => name.push(ch),
            }
        }

        let numbers: Vec<Option<u32>> = params
            .split(',')
            .map(|p| p.trim().parse::<u32>().ok())
            .collect();

        Self {
            name: normalize_type_name(&name),
            precision: numbers.first().copied().flatten(),
            scale: numbers.get(1).copied().flatten(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.precision, self.scale) {
            (Some(p), Some(s)) => write!(f, "{}({},{})", self.name, p, s),
            (Some(p), None) => write!(f, "{}({})", self.name, p),
            _ => f.write_str(&self.name),
        }
    }
}

/// Lowercase and collapse internal whitespace.
fn normalize_type_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A column as described by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: &str, data_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}
