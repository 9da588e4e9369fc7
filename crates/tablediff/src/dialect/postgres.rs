//! PostgreSQL SQL dialect.

use super::{zero_pad_literal, Dialect, DialectKind};
use crate::checksum::CHECKSUM_MODULUS;
use crate::core::identifier::quote_pg;
use crate::error::Result;
use crate::normalize::NormalizeRule;

#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn bigint_type(&self) -> &'static str {
        "BIGINT"
    }

    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    fn normalize_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS TEXT)", column),
            NormalizeRule::Decimal { scale } => {
                format!("CAST(TRUNC({}, {}) AS TEXT)", column, scale)
            }
            NormalizeRule::Timestamp { precision } if precision >= 6 => {
                format!("TO_CHAR({}, 'YYYY-MM-DD HH24:MI:SS.US')", column)
            }
            NormalizeRule::Timestamp { precision } => format!(
                "TO_CHAR({c}, 'YYYY-MM-DD HH24:MI:SS') || '.' || SUBSTR(TO_CHAR({c}, 'US'), 1, {p}) || {z}",
                c = column,
                p = precision,
                z = zero_pad_literal(precision)
            ),
            NormalizeRule::Boolean => format!("CAST(CAST({} AS INTEGER) AS TEXT)", column),
            NormalizeRule::Uuid => format!("LOWER(CAST({} AS TEXT))", column),
            NormalizeRule::Text => format!("CAST({} AS TEXT)", column),
        }
    }

    fn text_digest_expr(&self, column: &str) -> String {
        format!(
            "ENCODE(SHA256(CONVERT_TO(CAST({} AS TEXT), 'UTF8')), 'hex')",
            column
        )
    }

    fn concat(&self, parts: &[String]) -> String {
        parts.join(" || ")
    }

    fn row_hash_expr(&self, row: &str) -> String {
        // Hex digits 50..64 of the digest are its last 15.
        format!(
            "('x' || SUBSTR(ENCODE(SHA256(CONVERT_TO({}, 'UTF8')), 'hex'), 50))::BIT(60)::BIGINT",
            row
        )
    }

    fn checksum_expr(&self, hash: &str) -> String {
        format!(
            "CAST(COALESCE(SUM({}) % {}, 0) AS BIGINT)",
            hash, CHECKSUM_MODULUS
        )
    }

    fn fetch_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Integer => format!("CAST({} AS BIGINT)", column),
            NormalizeRule::Text => format!("CAST({} AS TEXT)", column),
            _ => column.to_string(),
        }
    }

    fn default_schema_expr(&self) -> &'static str {
        "current_schema()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exprs() {
        let d = PostgresDialect::new();
        assert_eq!(d.normalize_expr("\"n\"", NormalizeRule::Integer), "CAST(\"n\" AS TEXT)");
        assert_eq!(
            d.normalize_expr("\"amt\"", NormalizeRule::Decimal { scale: 2 }),
            "CAST(TRUNC(\"amt\", 2) AS TEXT)"
        );
        assert_eq!(
            d.normalize_expr("\"ts\"", NormalizeRule::Timestamp { precision: 6 }),
            "TO_CHAR(\"ts\", 'YYYY-MM-DD HH24:MI:SS.US')"
        );
        assert_eq!(
            d.normalize_expr("\"ts\"", NormalizeRule::Timestamp { precision: 3 }),
            "TO_CHAR(\"ts\", 'YYYY-MM-DD HH24:MI:SS') || '.' || SUBSTR(TO_CHAR(\"ts\", 'US'), 1, 3) || '000'"
        );
        assert_eq!(
            d.normalize_expr("\"b\"", NormalizeRule::Boolean),
            "CAST(CAST(\"b\" AS INTEGER) AS TEXT)"
        );
    }

    #[test]
    fn test_row_hash_and_checksum() {
        let d = PostgresDialect::new();
        let hash = d.row_hash_expr("r");
        assert_eq!(
            hash,
            "('x' || SUBSTR(ENCODE(SHA256(CONVERT_TO(r, 'UTF8')), 'hex'), 50))::BIT(60)::BIGINT"
        );
        assert_eq!(
            d.checksum_expr("h"),
            "CAST(COALESCE(SUM(h) % 1152921504606846976, 0) AS BIGINT)"
        );
    }

    #[test]
    fn test_concat() {
        let d = PostgresDialect::new();
        assert_eq!(d.concat(&["a".into(), "'|'".into(), "b".into()]), "a || '|' || b");
    }
}
