//! Configuration validation.

use std::collections::HashSet;

use super::{Config, DatabaseConfig, TableConfig};
use crate::core::identifier::validate_identifier;
use crate::core::TablePath;
use crate::drivers::SslMode;
use crate::error::{DiffError, Result};
use crate::normalize::MAX_TIMESTAMP_PRECISION;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_table("table1", config, &config.table1)?;
    validate_table("table2", config, &config.table2)?;

    if config.table1.columns.len() != config.table2.columns.len() {
        return Err(DiffError::Config(format!(
            "table1 compares {} columns but table2 compares {}; columns are paired by position",
            config.table1.columns.len(),
            config.table2.columns.len()
        )));
    }

    // Diff settings - only check if explicitly set
    if let Some(0) = config.diff.bisection_threshold {
        return Err(DiffError::Config(
            "diff.bisection_threshold must be at least 1".into(),
        ));
    }
    if let Some(factor) = config.diff.bisection_factor {
        if factor < 2 {
            return Err(DiffError::Config(
                "diff.bisection_factor must be at least 2".into(),
            ));
        }
    }
    if let Some(0) = config.diff.max_concurrency {
        return Err(DiffError::Config(
            "diff.max_concurrency must be at least 1".into(),
        ));
    }
    if let Some(p) = config.diff.timestamp_precision {
        if p > MAX_TIMESTAMP_PRECISION {
            return Err(DiffError::Config(format!(
                "diff.timestamp_precision must be between 0 and {}, got {}",
                MAX_TIMESTAMP_PRECISION, p
            )));
        }
    }

    for o in &config.type_overrides {
        if o.type_name.trim().is_empty() {
            return Err(DiffError::Config(
                "type_overrides entries need a non-empty type_name".into(),
            ));
        }
    }

    Ok(())
}

fn validate_table(side: &str, config: &Config, table: &TableConfig) -> Result<()> {
    validate_database(side, &table.database)?;

    if table.table.is_empty() {
        return Err(DiffError::Config(format!("{}.table is required", side)));
    }
    TablePath::parse(&table.table)?;

    let key = config.key_column_for(table);
    validate_identifier(key)
        .map_err(|e| DiffError::Config(format!("{}: invalid key column: {}", side, e)))?;

    let mut seen = HashSet::new();
    for column in &table.columns {
        validate_identifier(column)
            .map_err(|e| DiffError::Config(format!("{}.columns: {}", side, e)))?;
        if column == key {
            return Err(DiffError::Config(format!(
                "{}.columns must not include the key column '{}'",
                side, key
            )));
        }
        if !seen.insert(column.as_str()) {
            return Err(DiffError::Config(format!(
                "{}.columns lists '{}' more than once",
                side, column
            )));
        }
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(DiffError::Config(format!("{}.database.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(DiffError::Config(format!(
            "{}.database.database is required",
            side
        )));
    }
    if db.user.is_empty() {
        return Err(DiffError::Config(format!("{}.database.user is required", side)));
    }
    if let Some(0) = db.max_connections {
        return Err(DiffError::Config(format!(
            "{}.database.max_connections must be at least 1",
            side
        )));
    }
    SslMode::parse(db.get_ssl_mode())?;
    Ok(())
}
