//! SQL Server SQL dialect.
//!
//! Every part of a row string is `VARCHAR` so `HASHBYTES` sees single-byte
//! ASCII text. Text columns are converted through a UTF-8 collation before
//! hashing so their digest matches the other engines (SQL Server 2019+).

use super::{zero_pad_literal, Dialect, DialectKind};
use crate::checksum::CHECKSUM_MODULUS;
use crate::core::identifier::quote_mssql;
use crate::error::Result;
use crate::normalize::NormalizeRule;

#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn bigint_type(&self) -> &'static str {
        "BIGINT"
    }

    fn text_type(&self) -> &'static str {
        "NVARCHAR(256)"
    }

    fn normalize_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS VARCHAR(20))", column),
            NormalizeRule::Decimal { scale } => format!(
                "CAST(CAST(ROUND({c}, {s}, 1) AS DECIMAL(38, {s})) AS VARCHAR(64))",
                c = column,
                s = scale
            ),
            NormalizeRule::Timestamp { precision } if precision >= 6 => format!(
                "CAST(FORMAT({}, 'yyyy-MM-dd HH:mm:ss.ffffff', 'en-US') AS VARCHAR(26))",
                column
            ),
            NormalizeRule::Timestamp { precision } => format!(
                "CAST(CONCAT(FORMAT({c}, 'yyyy-MM-dd HH:mm:ss', 'en-US'), '.', LEFT(FORMAT({c}, 'ffffff', 'en-US'), {p}), {z}) AS VARCHAR(26))",
                c = column,
                p = precision,
                z = zero_pad_literal(precision)
            ),
            NormalizeRule::Boolean => format!("CAST({} AS VARCHAR(1))", column),
            NormalizeRule::Uuid => format!("LOWER(CAST({} AS VARCHAR(36)))", column),
            NormalizeRule::Text => format!("CAST({} AS NVARCHAR(MAX))", column),
        }
    }

    fn text_digest_expr(&self, column: &str) -> String {
        format!(
            "LOWER(CONVERT(VARCHAR(64), HASHBYTES('SHA2_256', \
             CAST(CAST({} AS NVARCHAR(MAX)) COLLATE Latin1_General_100_BIN2_UTF8 AS VARCHAR(MAX))), 2))",
            column
        )
    }

    fn concat(&self, parts: &[String]) -> String {
        // CONCAT requires at least two arguments.
        match parts {
            [single] => single.clone(),
            _ => format!("CONCAT({})", parts.join(", ")),
        }
    }

    fn row_hash_expr(&self, row: &str) -> String {
        format!(
            "CONVERT(BIGINT, CONVERT(VARBINARY(8), '0' + RIGHT(LOWER(CONVERT(VARCHAR(64), \
             HASHBYTES('SHA2_256', {}), 2)), 15), 2))",
            row
        )
    }

    fn checksum_expr(&self, hash: &str) -> String {
        format!(
            "CAST(COALESCE(SUM(CAST({} AS DECIMAL(38, 0))) % {}, 0) AS BIGINT)",
            hash, CHECKSUM_MODULUS
        )
    }

    fn fetch_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS BIGINT)", column),
            NormalizeRule::Text => format!("CAST({} AS NVARCHAR(MAX))", column),
            _ => column.to_string(),
        }
    }

    fn default_schema_expr(&self) -> &'static str {
        "SCHEMA_NAME()"
    }

    fn count_expr(&self, arg: &str) -> String {
        format!("COUNT_BIG({})", arg)
    }

    fn limit_query(&self, projection: &str, rest: &str, limit: Option<usize>) -> String {
        match limit {
            Some(n) => format!("SELECT TOP ({}) {} {}", n, projection, rest),
            None => format!("SELECT {} {}", projection, rest),
        }
    }
}
