//! SQL dialects (Strategy pattern).
//!
//! Each engine implements the small set of required [`Dialect`] methods:
//! quoting, casts, hashing, concatenation and limits. The provided methods
//! assemble those into the queries the diff engine issues, so every engine
//! runs the same query shapes:
//!
//! | query            | shape                                                        |
//! |------------------|--------------------------------------------------------------|
//! | count            | `SELECT COUNT(*) FROM t WHERE k >= a AND k < b`              |
//! | count + checksum | `SELECT COUNT(*), SUM(row_hash) % 2^60 FROM t WHERE ...`     |
//! | key bounds       | `SELECT MIN(k), MAX(k), COUNT(k) FROM t WHERE ...`           |
//! | fetch            | `SELECT k, c1, ... FROM t WHERE ... ORDER BY k [LIMIT n]`    |
//! | sample keys      | `SELECT k FROM t WHERE ... GROUP BY k ORDER BY k LIMIT n`    |
//! | describe         | `information_schema.columns` in ordinal order                |

mod mssql;
mod mysql;
mod postgres;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checksum::{FIELD_SEPARATOR, NULL_TOKEN};
use crate::core::identifier::quote_literal;
use crate::core::{Scan, TablePath};
use crate::error::{DiffError, Result};
use crate::normalize::NormalizeRule;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    Mysql,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Mssql => "mssql",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::Mysql),
            "mssql" | "sqlserver" => Ok(DialectKind::Mssql),
            "snowflake" => Err(DiffError::Config(
                "Snowflake is not supported: there is no Snowflake adapter; \
                 expected postgres, mysql or mssql"
                    .into(),
            )),
            other => Err(DiffError::Config(format!(
                "Unknown database type '{}': expected postgres, mysql or mssql",
                other
            ))),
        }
    }
}

/// Engine-specific SQL generation.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Validate and quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Type name used for `CAST(x AS ...)` to a signed 64-bit integer.
    fn bigint_type(&self) -> &'static str;

    /// Type name used for `CAST(x AS ...)` to text in catalog queries.
    fn text_type(&self) -> &'static str;

    /// SQL rendering of a normalization rule over an already quoted column.
    fn normalize_expr(&self, column: &str, rule: NormalizeRule) -> String;

    /// Lowercase hex SHA-256 of the column's UTF-8 text.
    fn text_digest_expr(&self, column: &str) -> String;

    /// Concatenate text expressions.
    fn concat(&self, parts: &[String]) -> String;

    /// 60-bit integer hash of a row-string expression.
    fn row_hash_expr(&self, row: &str) -> String;

    /// `SUM(hash) % 2^60` cast to a signed 64-bit integer, 0 for no rows.
    fn checksum_expr(&self, hash: &str) -> String;

    /// Projection for a raw fetch of a column the driver can decode.
    fn fetch_expr(&self, column: &str, rule: NormalizeRule) -> String;

    /// Expression naming the connection's default schema.
    fn default_schema_expr(&self) -> &'static str;

    fn count_expr(&self, arg: &str) -> String {
        format!("COUNT({})", arg)
    }

    /// Catalog expression naming a column's type in `information_schema.columns`.
    fn type_name_expr(&self) -> &'static str {
        "data_type"
    }

    /// Assemble `SELECT <projection> <rest>` with an optional row limit.
    fn limit_query(&self, projection: &str, rest: &str, limit: Option<usize>) -> String {
        match limit {
            Some(n) => format!("SELECT {} {} LIMIT {}", projection, rest, n),
            None => format!("SELECT {} {}", projection, rest),
        }
    }

    fn cast_bigint(&self, expr: &str) -> String {
        format!("CAST({} AS {})", expr, self.bigint_type())
    }

    fn qualify(&self, table: &TablePath) -> Result<String> {
        match &table.schema {
            Some(schema) => Ok(format!(
                "{}.{}",
                self.quote_ident(schema)?,
                self.quote_ident(&table.table)?
            )),
            None => self.quote_ident(&table.table),
        }
    }

    /// Encoded checksum field for a column: text is digested, everything else normalized.
    fn field_expr(&self, column: &str, rule: NormalizeRule) -> String {
        match rule {
            NormalizeRule::Text => self.text_digest_expr(column),
            other => self.normalize_expr(column, other),
        }
    }

    /// Row string: key, then each encoded field with NULL replaced by the null token.
    fn row_string_expr(&self, scan: &Scan<'_>) -> Result<String> {
        let separator = format!("'{}'", FIELD_SEPARATOR);
        let mut parts = vec![self.normalize_expr(&self.quote_ident(scan.key)?, NormalizeRule::Integer)];
        for column in scan.columns {
            let field = self.field_expr(&self.quote_ident(&column.name)?, column.rule);
            parts.push(separator.clone());
            parts.push(format!("COALESCE({}, '{}')", field, NULL_TOKEN));
        }
        Ok(self.concat(&parts))
    }

    fn where_clause(&self, scan: &Scan<'_>) -> Result<String> {
        Ok(match scan.range {
            Some(range) => {
                let key = self.quote_ident(scan.key)?;
                match range.end_key() {
                    Some(end) => {
                        format!(" WHERE {} >= {} AND {} < {}", key, range.start, key, end)
                    }
                    None => format!(" WHERE {} >= {}", key, range.start),
                }
            }
            None => String::new(),
        })
    }

    fn build_count(&self, scan: &Scan<'_>) -> Result<String> {
        Ok(format!(
            "SELECT {} FROM {}{}",
            self.count_expr("*"),
            self.qualify(scan.table)?,
            self.where_clause(scan)?
        ))
    }

    fn build_count_and_checksum(&self, scan: &Scan<'_>) -> Result<String> {
        let hash = self.row_hash_expr(&self.row_string_expr(scan)?);
        Ok(format!(
            "SELECT {}, {} FROM {}{}",
            self.count_expr("*"),
            self.checksum_expr(&hash),
            self.qualify(scan.table)?,
            self.where_clause(scan)?
        ))
    }

    fn build_key_bounds(&self, scan: &Scan<'_>) -> Result<String> {
        let key = self.quote_ident(scan.key)?;
        Ok(format!(
            "SELECT {}, {}, {} FROM {}{}",
            self.cast_bigint(&format!("MIN({})", key)),
            self.cast_bigint(&format!("MAX({})", key)),
            self.count_expr(&key),
            self.qualify(scan.table)?,
            self.where_clause(scan)?
        ))
    }

    fn build_fetch_rows(&self, scan: &Scan<'_>, limit: Option<usize>) -> Result<String> {
        let key = self.quote_ident(scan.key)?;
        let mut projection = vec![self.cast_bigint(&key)];
        for column in scan.columns {
            projection.push(self.fetch_expr(&self.quote_ident(&column.name)?, column.rule));
        }
        let rest = format!(
            "FROM {}{} ORDER BY {}",
            self.qualify(scan.table)?,
            self.where_clause(scan)?,
            key
        );
        Ok(self.limit_query(&projection.join(", "), &rest, limit))
    }

    fn build_sample_keys(&self, scan: &Scan<'_>, limit: usize) -> Result<String> {
        let key = self.quote_ident(scan.key)?;
        let rest = format!(
            "FROM {}{} GROUP BY {} ORDER BY {}",
            self.qualify(scan.table)?,
            self.where_clause(scan)?,
            key,
            key
        );
        Ok(self.limit_query(&self.cast_bigint(&key), &rest, Some(limit)))
    }

    /// Catalog query returning name, type, numeric precision, numeric scale
    /// and datetime precision per column.
    fn build_describe(&self, table: &TablePath) -> Result<String> {
        let schema = match &table.schema {
            Some(schema) => quote_literal(schema)?,
            None => self.default_schema_expr().to_string(),
        };
        let text = |col: &str| format!("CAST({} AS {})", col, self.text_type());
        Ok(format!(
            "SELECT {}, {}, {}, {}, {} FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            text("column_name"),
            text(self.type_name_expr()),
            self.cast_bigint("numeric_precision"),
            self.cast_bigint("numeric_scale"),
            self.cast_bigint("datetime_precision"),
            schema,
            quote_literal(&table.table)?
        ))
    }

    /// Statement run once on every new connection, if any.
    fn session_setup(&self) -> Option<&'static str> {
        None
    }
}

/// Enum-based static dispatch for dialects, selected once per connection.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
}

impl DialectImpl {
    pub fn from_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            DialectKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DialectKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
        }
    }

    fn inner(&self) -> &dyn Dialect {
        match self {
            DialectImpl::Postgres(d) => d,
            DialectImpl::Mysql(d) => d,
            DialectImpl::Mssql(d) => d,
        }
    }
}

impl Dialect for DialectImpl {
    fn kind(&self) -> DialectKind {
        self.inner().kind()
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        self.inner().quote_ident(name)
    }

    fn bigint_type(&self) -> &'static str {
        self.inner().bigint_type()
    }

    fn text_type(&self) -> &'static str {
        self.inner().text_type()
    }

    fn normalize_expr(&self, column: &str, rule: NormalizeRule) -> String {
        self.inner().normalize_expr(column, rule)
    }

    fn text_digest_expr(&self, column: &str) -> String {
        self.inner().text_digest_expr(column)
    }

    fn concat(&self, parts: &[String]) -> String {
        self.inner().concat(parts)
    }

    fn row_hash_expr(&self, row: &str) -> String {
        self.inner().row_hash_expr(row)
    }

    fn checksum_expr(&self, hash: &str) -> String {
        self.inner().checksum_expr(hash)
    }

    fn fetch_expr(&self, column: &str, rule: NormalizeRule) -> String {
        self.inner().fetch_expr(column, rule)
    }

    fn default_schema_expr(&self) -> &'static str {
        self.inner().default_schema_expr()
    }

    fn count_expr(&self, arg: &str) -> String {
        self.inner().count_expr(arg)
    }

    fn type_name_expr(&self) -> &'static str {
        self.inner().type_name_expr()
    }

    fn limit_query(&self, projection: &str, rest: &str, limit: Option<usize>) -> String {
        self.inner().limit_query(projection, rest, limit)
    }

    fn session_setup(&self) -> Option<&'static str> {
        self.inner().session_setup()
    }
}

/// `'0'` repeated, as a SQL string literal, padding truncated fractions to six digits.
pub(crate) fn zero_pad_literal(precision: u32) -> String {
    format!("'{}'", "0".repeat(6usize.saturating_sub(precision as usize)))
}
