//! Identifier validation and quoting for generated SQL.
//!
//! Table, schema and column names cannot be bound as query parameters, so every
//! name that reaches a generated statement goes through one of these functions.
//! Names are validated (non-empty, no null byte, bounded length) and then quoted
//! with the engine's delimiter, doubling any embedded delimiter.

use crate::error::{DiffError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// # Errors
///
/// Returns `DiffError::Config` for empty names, names containing a null byte,
/// and names longer than the maximum identifier length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DiffError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DiffError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DiffError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier with double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier with backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQL Server identifier with brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Render a string as a single-quoted SQL literal.
///
/// Used for catalog lookups (`WHERE table_name = '...'`), never for row data.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(DiffError::Config(format!(
            "SECURITY: Literal contains null byte: {:?}",
            value
        )));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("order items").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_limit() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let result = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1));
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_per_engine() {
        assert_eq!(quote_pg("ra\"tings").unwrap(), "\"ra\"\"tings\"");
        assert_eq!(quote_mysql("ra`tings").unwrap(), "`ra``tings`");
        assert_eq!(quote_mssql("ra]tings").unwrap(), "[ra]]tings]");
    }

    #[test]
    fn test_quote_injection_is_contained() {
        assert_eq!(
            quote_pg("x\"; DROP TABLE t;--").unwrap(),
            "\"x\"\"; DROP TABLE t;--\""
        );
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("o'brien").unwrap(), "'o''brien'");
        assert!(quote_literal("a\0b").is_err());
    }
}
