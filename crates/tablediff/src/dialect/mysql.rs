//! MySQL SQL dialect.
//!
//! Connections run with `time_zone = '+00:00'` so `TIMESTAMP` columns render
//! the same way on every session.

use super::{zero_pad_literal, Dialect, DialectKind};
use crate::checksum::CHECKSUM_MODULUS;
use crate::core::identifier::quote_mysql;
use crate::error::Result;
use crate::normalize::NormalizeRule;

#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn bigint_type(&self) -> &'static str {
        "SIGNED"
    }

    fn text_type(&self) -> &'static str {
        "CHAR"
    }

    fn normalize_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS CHAR)", column),
            NormalizeRule::Decimal { scale } => {
                format!("CAST(TRUNCATE({}, {}) AS CHAR)", column, scale)
            }
            NormalizeRule::Timestamp { precision } if precision >= 6 => {
                format!("DATE_FORMAT({}, '%Y-%m-%d %H:%i:%s.%f')", column)
            }
            NormalizeRule::Timestamp { precision } => format!(
                "CONCAT(DATE_FORMAT({c}, '%Y-%m-%d %H:%i:%s'), '.', SUBSTRING(DATE_FORMAT({c}, '%f'), 1, {p}), {z})",
                c = column,
                p = precision,
                z = zero_pad_literal(precision)
            ),
            NormalizeRule::Boolean => format!("CAST(({} <> 0) AS CHAR)", column),
            NormalizeRule::Uuid => format!("LOWER(CAST({} AS CHAR))", column),
            NormalizeRule::Text => format!("CAST({} AS CHAR)", column),
        }
    }

    fn text_digest_expr(&self, column: &str) -> String {
        format!("SHA2(CONVERT({} USING utf8mb4), 256)", column)
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn row_hash_expr(&self, row: &str) -> String {
        format!(
            "CAST(CONV(SUBSTRING(SHA2({}, 256), 50), 16, 10) AS UNSIGNED)",
            row
        )
    }

    fn checksum_expr(&self, hash: &str) -> String {
        format!(
            "CAST(COALESCE(SUM({}) % {}, 0) AS SIGNED)",
            hash, CHECKSUM_MODULUS
        )
    }

    fn fetch_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS SIGNED)", column),
            NormalizeRule::Uuid => format!("CAST({} AS CHAR)", column),
            _ => column.to_string(),
        }
    }

    fn default_schema_expr(&self) -> &'static str {
        "DATABASE()"
    }

    fn type_name_expr(&self) -> &'static str {
        // `data_type` drops the sign; `column_type` carries display widths.
        "IF(column_type LIKE '%unsigned%', CONCAT(data_type, ' unsigned'), data_type)"
    }

    fn session_setup(&self) -> Option<&'static str> {
        Some("SET time_zone = '+00:00'")
    }
}
