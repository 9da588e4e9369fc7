//! Registry mapping `(dialect, type name)` to a type category.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{ColumnType, TypeCategory};
use crate::dialect::DialectKind;
use crate::error::{DiffError, Result};

/// A configured addition or replacement for a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOverride {
    pub dialect: DialectKind,
    pub type_name: String,
    pub category: TypeCategory,
}

/// Lookup table from declared column types to normalization categories.
///
/// Built once (built-ins plus configured overrides) and passed by reference.
/// Floating-point types and blank-padded `char`/`bpchar` are not registered;
/// their values do not compare exactly across engines. Neither is MySQL
/// `bigint unsigned`, whose values may not fit a signed 64-bit integer.
#[derive(Debug, Clone, Default)]
pub struct NormalizationRegistry {
    categories: HashMap<(DialectKind, String), TypeCategory>,
}

const POSTGRES_TYPES: &[(&str, TypeCategory)] = &[
    ("smallint", TypeCategory::Integer),
    ("integer", TypeCategory::Integer),
    ("int", TypeCategory::Integer),
    ("bigint", TypeCategory::Integer),
    ("int2", TypeCategory::Integer),
    ("int4", TypeCategory::Integer),
    ("int8", TypeCategory::Integer),
    ("numeric", TypeCategory::Decimal),
    ("decimal", TypeCategory::Decimal),
    ("timestamp", TypeCategory::Timestamp),
    ("timestamp without time zone", TypeCategory::Timestamp),
    ("boolean", TypeCategory::Boolean),
    ("uuid", TypeCategory::Uuid),
    ("text", TypeCategory::Text),
    ("character varying", TypeCategory::Text),
    ("varchar", TypeCategory::Text),
];

const MYSQL_TYPES: &[(&str, TypeCategory)] = &[
    ("tinyint", TypeCategory::Integer),
    ("smallint", TypeCategory::Integer),
    ("mediumint", TypeCategory::Integer),
    ("int", TypeCategory::Integer),
    ("integer", TypeCategory::Integer),
    ("bigint", TypeCategory::Integer),
    ("tinyint unsigned", TypeCategory::Integer),
    ("smallint unsigned", TypeCategory::Integer),
    ("mediumint unsigned", TypeCategory::Integer),
    ("int unsigned", TypeCategory::Integer),
    ("integer unsigned", TypeCategory::Integer),
    ("decimal", TypeCategory::Decimal),
    ("numeric", TypeCategory::Decimal),
    ("decimal unsigned", TypeCategory::Decimal),
    ("numeric unsigned", TypeCategory::Decimal),
    ("timestamp", TypeCategory::Timestamp),
    ("datetime", TypeCategory::Timestamp),
    ("varchar", TypeCategory::Text),
    ("text", TypeCategory::Text),
    ("tinytext", TypeCategory::Text),
    ("mediumtext", TypeCategory::Text),
    ("longtext", TypeCategory::Text),
];

/// Fractional-second precision of timestamp types declared without one.
const IMPLIED_TIMESTAMP_PRECISION: &[(DialectKind, &str, u32)] = &[
    (DialectKind::Postgres, "timestamp", 6),
    (DialectKind::Postgres, "timestamp without time zone", 6),
    (DialectKind::Mysql, "datetime", 0),
    (DialectKind::Mysql, "timestamp", 0),
    (DialectKind::Mssql, "datetime", 3),
    (DialectKind::Mssql, "datetime2", 7),
    (DialectKind::Mssql, "smalldatetime", 0),
];

const MSSQL_TYPES: &[(&str, TypeCategory)] = &[
    ("tinyint", TypeCategory::Integer),
    ("smallint", TypeCategory::Integer),
    ("int", TypeCategory::Integer),
    ("bigint", TypeCategory::Integer),
    ("decimal", TypeCategory::Decimal),
    ("numeric", TypeCategory::Decimal),
    ("datetime2", TypeCategory::Timestamp),
    ("datetime", TypeCategory::Timestamp),
    ("smalldatetime", TypeCategory::Timestamp),
    ("bit", TypeCategory::Boolean),
    ("uniqueidentifier", TypeCategory::Uuid),
    ("varchar", TypeCategory::Text),
    ("nvarchar", TypeCategory::Text),
    ("text", TypeCategory::Text),
    ("ntext", TypeCategory::Text),
];

impl NormalizationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules for every supported engine.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (dialect, types) in [
            (DialectKind::Postgres, POSTGRES_TYPES),
            (DialectKind::Mysql, MYSQL_TYPES),
            (DialectKind::Mssql, MSSQL_TYPES),
        ] {
            for (name, category) in types {
                registry.register(dialect, name, *category);
            }
        }
        registry
    }

    /// Built-ins plus overrides; an override replaces a built-in of the same name.
    pub fn with_overrides(overrides: &[TypeOverride]) -> Self {
        let mut registry = Self::builtin();
        for o in overrides {
            registry.register(o.dialect, &o.type_name, o.category);
        }
        registry
    }

    /// Add or replace an entry. The name is normalized like a parsed declaration.
    pub fn register(&mut self, dialect: DialectKind, type_name: &str, category: TypeCategory) {
        let name = ColumnType::parse(type_name).name;
        self.categories.insert((dialect, name), category);
    }

    /// Precision an engine gives a timestamp type declared without one.
    pub fn implied_precision(&self, dialect: DialectKind, data_type: &ColumnType) -> Option<u32> {
        IMPLIED_TIMESTAMP_PRECISION
            .iter()
            .find(|(d, name, _)| *d == dialect && *name == data_type.name)
            .map(|(_, _, precision)| *precision)
    }

    pub fn category(&self, dialect: DialectKind, data_type: &ColumnType) -> Option<TypeCategory> {
        self.categories
            .get(&(dialect, data_type.name.clone()))
            .copied()
    }

    /// Category for a column, or a configuration error naming the column.
    pub fn require(
        &self,
        dialect: DialectKind,
        data_type: &ColumnType,
        column: &str,
    ) -> Result<TypeCategory> {
        self.category(dialect, data_type).ok_or_else(|| {
            DiffError::Config(format!(
                "Column '{}' has type '{}' on {}, which has no normalization rule \
                 (add a type_overrides entry to compare it)",
                column, data_type, dialect
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
