//! Value normalization.
//!
//! A [`NormalizeRule`] maps raw values of one type category to a canonical
//! string that compares equal across engines. Every rule has two renderings
//! that must agree for every supported value:
//!
//! - an in-process rendering ([`NormalizeRule::normalize`]) applied to fetched rows
//! - a SQL rendering produced by each [`Dialect`](crate::dialect::Dialect), used
//!   inside pushed-down checksum queries
//!
//! Rules for a pair of columns are negotiated from both sides' declared types:
//! timestamps use the smaller fractional precision, decimals the smaller scale.

mod registry;

pub use registry::{NormalizationRegistry, TypeOverride};

use std::fmt;

use chrono::Timelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{ColumnInfo, SqlValue, TypeCategory};
use crate::dialect::DialectKind;
use crate::error::{DiffError, Result};

/// Largest fractional-second precision carried by normalized timestamps.
pub const MAX_TIMESTAMP_PRECISION: u32 = 6;

/// Precision assumed for a timestamp column that declares none and whose
/// type implies none.
pub const DEFAULT_TIMESTAMP_PRECISION: u32 = 6;

/// Resolved normalization for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum NormalizeRule {
    Integer,
    Decimal { scale: u32 },
    Timestamp { precision: u32 },
    Boolean,
    Uuid,
    Text,
}

impl NormalizeRule {
    pub fn category(&self) -> TypeCategory {
        match self {
            NormalizeRule::Integer => TypeCategory::Integer,
            NormalizeRule::Decimal { .. } => TypeCategory::Decimal,
            NormalizeRule::Timestamp { .. } => TypeCategory::Timestamp,
            NormalizeRule::Boolean => TypeCategory::Boolean,
            NormalizeRule::Uuid => TypeCategory::Uuid,
            NormalizeRule::Text => TypeCategory::Text,
        }
    }

    /// Canonical string for a raw value; `None` for NULL.
    pub fn normalize(&self, value: &SqlValue) -> Result<Option<String>> {
        if value.is_null() {
            return Ok(None);
        }

        let normalized = match (self, value) {
            (NormalizeRule::Integer, SqlValue::I64(v)) => v.to_string(),
            (NormalizeRule::Decimal { scale }, SqlValue::Decimal(d)) => format_decimal(*d, *scale),
            (NormalizeRule::Decimal { scale }, SqlValue::I64(v)) => {
                format_decimal(Decimal::from(*v), *scale)
            }
            (NormalizeRule::Timestamp { precision }, SqlValue::DateTime(ts)) => {
                format_timestamp(ts, *precision)
            }
            (NormalizeRule::Boolean, SqlValue::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
            (NormalizeRule::Boolean, SqlValue::I64(v)) => if *v != 0 { "1" } else { "0" }.to_string(),
            (NormalizeRule::Uuid, SqlValue::Uuid(u)) => u.hyphenated().to_string(),
            (NormalizeRule::Uuid, SqlValue::Text(s)) => uuid::Uuid::parse_str(s.trim())
                .map_err(|e| DiffError::Config(format!("Invalid UUID value {:?}: {}", s, e)))?
                .hyphenated()
                .to_string(),
            (NormalizeRule::Text, SqlValue::Text(s)) => s.clone(),
            (rule, other) => {
                return Err(DiffError::Config(format!(
                    "Cannot normalize a {} value under the {} rule",
                    other.kind_name(),
                    rule.category()
                )))
            }
        };

        Ok(Some(normalized))
    }

    /// Field encoding used in row checksums.
    ///
    /// Text is replaced by the hex SHA-256 of its UTF-8 bytes so no encoded
    /// field can contain the field separator; NULL becomes [`NULL_TOKEN`](crate::checksum::NULL_TOKEN).
    pub fn encode_normalized(&self, normalized: Option<&str>) -> String {
        match (self, normalized) {
            (_, None) => crate::checksum::NULL_TOKEN.to_string(),
            (NormalizeRule::Text, Some(text)) => sha256_hex(text.as_bytes()),
            (_, Some(value)) => value.to_string(),
        }
    }
}

impl fmt::Display for NormalizeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeRule::Decimal { scale } => write!(f, "decimal(scale={})", scale),
            NormalizeRule::Timestamp { precision } => write!(f, "timestamp(precision={})", precision),
            other => write!(f, "{}", other.category()),
        }
    }
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Truncate to `scale` fractional digits and pad with zeros to exactly `scale`.
fn format_decimal(value: Decimal, scale: u32) -> String {
    let mut d = value.trunc_with_scale(scale);
    d.rescale(scale);
    if d.is_zero() {
        d.set_sign_positive(true);
    }
    d.to_string()
}

/// `YYYY-MM-DD HH:MM:SS.ffffff`, digits past `precision` replaced by zeros.
fn format_timestamp(ts: &chrono::NaiveDateTime, precision: u32) -> String {
    // Leap seconds carry nanoseconds >= 1e9.
    let micros = (ts.nanosecond() / 1_000).min(999_999);
    let digits = format!("{:06}", micros);
    let keep = precision.min(MAX_TIMESTAMP_PRECISION) as usize;
    format!(
        "{}.{}{}",
        ts.format("%Y-%m-%d %H:%M:%S"),
        &digits[..keep],
        "0".repeat(6 - keep)
    )
}

/// Column of a segment together with its resolved rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPlan {
    pub name: String,
    pub rule: NormalizeRule,
}

/// Resolved rules for every compared column of one side, in comparison order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPlan {
    pub columns: Vec<ColumnPlan>,
}

impl SegmentPlan {
    pub fn new(columns: Vec<ColumnPlan>) -> Self {
        Self { columns }
    }

    pub fn rules(&self) -> impl Iterator<Item = NormalizeRule> + '_ {
        self.columns.iter().map(|c| c.rule)
    }

    /// Resolve a plan for one side without a counterpart to negotiate with.
    pub fn resolve(
        registry: &NormalizationRegistry,
        dialect: DialectKind,
        columns: &[ColumnInfo],
        default_precision: u32,
    ) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|col| {
                let rule = negotiate_rule(
                    registry,
                    (dialect, col),
                    (dialect, col),
                    default_precision,
                )?;
                Ok(ColumnPlan {
                    name: col.name.clone(),
                    rule,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }
}

/// Negotiate one rule for a pair of positionally matched columns.
///
/// # Errors
///
/// `DiffError::Config` if either type has no registered category, the
/// categories differ, or a decimal declares no scale on either side.
pub fn negotiate_rule(
    registry: &NormalizationRegistry,
    a: (DialectKind, &ColumnInfo),
    b: (DialectKind, &ColumnInfo),
    default_precision: u32,
) -> Result<NormalizeRule> {
    let category_a = registry.require(a.0, &a.1.data_type, &a.1.name)?;
    let category_b = registry.require(b.0, &b.1.data_type, &b.1.name)?;

    if category_a != category_b {
        return Err(DiffError::Config(format!(
            "Column '{}' ({} on {}) cannot be compared with column '{}' ({} on {}): {} vs {}",
            a.1.name, a.1.data_type, a.0, b.1.name, b.1.data_type, b.0, category_a, category_b
        )));
    }

    let rule = match category_a {
        TypeCategory::Integer => NormalizeRule::Integer,
        TypeCategory::Boolean => NormalizeRule::Boolean,
        TypeCategory::Uuid => NormalizeRule::Uuid,
        TypeCategory::Text => NormalizeRule::Text,
        TypeCategory::Timestamp => {
            let declared = |(dialect, col): (DialectKind, &ColumnInfo)| {
                col.data_type
                    .precision
                    .or_else(|| registry.implied_precision(dialect, &col.data_type))
                    .unwrap_or(default_precision)
                    .min(MAX_TIMESTAMP_PRECISION)
            };
            NormalizeRule::Timestamp {
                precision: declared(a).min(declared(b)),
            }
        }
        TypeCategory::Decimal => {
            let scale = match (a.1.data_type.scale, b.1.data_type.scale) {
                (Some(sa), Some(sb)) => sa.min(sb),
                (Some(s), None) | (None, Some(s)) => s,
                (None, None) => {
                    return Err(DiffError::Config(format!(
                        "Decimal column '{}' declares no scale; declare one (e.g. numeric(18,2))",
                        a.1.name
                    )))
                }
            };
            NormalizeRule::Decimal { scale }
        }
    };

    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnType;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn ts(micros: u32) -> SqlValue {
        SqlValue::DateTime(
            NaiveDate::from_ymd_opt(2022, 3, 1)
                .unwrap()
                .and_hms_micro_opt(10, 20, 30, micros)
                .unwrap(),
        )
    }

    fn col(name: &str, decl: &str) -> ColumnInfo {
        ColumnInfo::new(name, ColumnType::parse(decl))
    }

    #[test]
    fn test_integer_widths_agree() {
        let rule = NormalizeRule::Integer;
        assert_eq!(rule.normalize(&SqlValue::from(42i32)).unwrap().unwrap(), "42");
        assert_eq!(rule.normalize(&SqlValue::I64(-7)).unwrap().unwrap(), "-7");
        assert_eq!(rule.normalize(&SqlValue::Null).unwrap(), None);
    }

    #[test]
    fn test_timestamp_truncates_never_rounds() {
        let rule = NormalizeRule::Timestamp { precision: 3 };
        assert_eq!(
            rule.normalize(&ts(123_999)).unwrap().unwrap(),
            "2022-03-01 10:20:30.123000"
        );
        let full = NormalizeRule::Timestamp { precision: 6 };
        assert_eq!(
            full.normalize(&ts(123_999)).unwrap().unwrap(),
            "2022-03-01 10:20:30.123999"
        );
        let none = NormalizeRule::Timestamp { precision: 0 };
        assert_eq!(
            none.normalize(&ts(999_999)).unwrap().unwrap(),
            "2022-03-01 10:20:30.000000"
        );
    }

    #[test]
    fn test_timestamp_drops_sub_microsecond_digits() {
        let value = SqlValue::DateTime(
            NaiveDate::from_ymd_opt(2022, 3, 1)
                .unwrap()
                .and_hms_nano_opt(0, 0, 0, 1_999)
                .unwrap(),
        );
        let rule = NormalizeRule::Timestamp { precision: 6 };
        assert_eq!(
            rule.normalize(&value).unwrap().unwrap(),
            "2022-03-01 00:00:00.000001"
        );
    }

    #[test]
    fn test_decimal_truncates_and_pads() {
        let rule = NormalizeRule::Decimal { scale: 2 };
        let d = |s: &str| SqlValue::Decimal(Decimal::from_str(s).unwrap());
        assert_eq!(rule.normalize(&d("12.349")).unwrap().unwrap(), "12.34");
        assert_eq!(rule.normalize(&d("-12.349")).unwrap().unwrap(), "-12.34");
        assert_eq!(rule.normalize(&d("5")).unwrap().unwrap(), "5.00");
        assert_eq!(rule.normalize(&d("-0.001")).unwrap().unwrap(), "0.00");
        assert_eq!(rule.normalize(&SqlValue::I64(3)).unwrap().unwrap(), "3.00");
        let whole = NormalizeRule::Decimal { scale: 0 };
        assert_eq!(whole.normalize(&d("9.99")).unwrap().unwrap(), "9");
    }

    #[test]
    fn test_boolean_uuid_text() {
        assert_eq!(NormalizeRule::Boolean.normalize(&SqlValue::Bool(true)).unwrap().unwrap(), "1");
        assert_eq!(NormalizeRule::Boolean.normalize(&SqlValue::I64(0)).unwrap().unwrap(), "0");

        let id = "A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11";
        let expected = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let parsed = SqlValue::Uuid(uuid::Uuid::parse_str(id).unwrap());
        assert_eq!(NormalizeRule::Uuid.normalize(&parsed).unwrap().unwrap(), expected);
        assert_eq!(
            NormalizeRule::Uuid.normalize(&SqlValue::from(id)).unwrap().unwrap(),
            expected
        );

        assert_eq!(
            NormalizeRule::Text.normalize(&SqlValue::from("a|b")).unwrap().unwrap(),
            "a|b"
        );
    }

    #[test]
    fn test_mismatched_value_is_error() {
        let err = NormalizeRule::Integer
            .normalize(&SqlValue::from("12"))
            .unwrap_err();
        assert!(err.to_string().contains("Cannot normalize a text value"));
    }

    #[test]
    fn test_encode_text_is_hashed() {
        let encoded = NormalizeRule::Text.encode_normalized(Some("abc"));
        assert_eq!(
            encoded,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(NormalizeRule::Integer.encode_normalized(Some("5")), "5");
        assert_eq!(NormalizeRule::Text.encode_normalized(None), "NULL");
    }

    #[test]
    fn test_negotiate_timestamp_takes_minimum() {
        let registry = NormalizationRegistry::builtin();
        let rule = negotiate_rule(
            &registry,
            (DialectKind::Postgres, &col("ts", "timestamp(6)")),
            (DialectKind::Mysql, &col("ts", "datetime(3)")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap();
        assert_eq!(rule, NormalizeRule::Timestamp { precision: 3 });

        let capped = negotiate_rule(
            &registry,
            (DialectKind::Mssql, &col("ts", "datetime2(7)")),
            (DialectKind::Postgres, &col("ts", "timestamp")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap();
        assert_eq!(capped, NormalizeRule::Timestamp { precision: 6 });
    }

    #[test]
    fn test_negotiate_decimal_scale() {
        let registry = NormalizationRegistry::builtin();
        let rule = negotiate_rule(
            &registry,
            (DialectKind::Postgres, &col("amount", "numeric(12,4)")),
            (DialectKind::Mssql, &col("amount", "decimal(12,2)")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap();
        assert_eq!(rule, NormalizeRule::Decimal { scale: 2 });

        let err = negotiate_rule(
            &registry,
            (DialectKind::Postgres, &col("amount", "numeric")),
            (DialectKind::Postgres, &col("amount", "numeric")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap_err();
        assert!(err.to_string().contains("declares no scale"));
    }

    #[test]
    fn test_negotiate_category_mismatch() {
        let registry = NormalizationRegistry::builtin();
        let err = negotiate_rule(
            &registry,
            (DialectKind::Postgres, &col("v", "integer")),
            (DialectKind::Postgres, &col("v", "text")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::Config(_)));
        assert!(err.to_string().contains("integer vs text"));
    }

    #[test]
    fn test_negotiate_unregistered_type() {
        let registry = NormalizationRegistry::builtin();
        let err = negotiate_rule(
            &registry,
            (DialectKind::Postgres, &col("price", "double precision")),
            (DialectKind::Postgres, &col("price", "double precision")),
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap_err();
        assert!(err.to_string().contains("double precision"));
    }

    #[test]
    fn test_segment_plan_resolve() {
        let registry = NormalizationRegistry::builtin();
        let plan = SegmentPlan::resolve(
            &registry,
            DialectKind::Mysql,
            &[col("n", "int"), col("ts", "datetime")],
            DEFAULT_TIMESTAMP_PRECISION,
        )
        .unwrap();
        let rules: Vec<_> = plan.rules().collect();
        assert_eq!(
            rules,
            vec![NormalizeRule::Integer, NormalizeRule::Timestamp { precision: 0 }]
        );
    }

    #[test]
    fn test_negotiate_uses_engine_implied_precision() {
        let registry = NormalizationRegistry::builtin();
        let negotiate = |a: (DialectKind, &str), b: (DialectKind, &str)| {
            negotiate_rule(
                &registry,
                (a.0, &col("ts", a.1)),
                (b.0, &col("ts", b.1)),
                DEFAULT_TIMESTAMP_PRECISION,
            )
            .unwrap()
        };

        assert_eq!(
            negotiate((DialectKind::Postgres, "timestamp(6)"), (DialectKind::Mysql, "datetime")),
            NormalizeRule::Timestamp { precision: 0 }
        );
        assert_eq!(
            negotiate((DialectKind::Postgres, "timestamp"), (DialectKind::Mssql, "datetime")),
            NormalizeRule::Timestamp { precision: 3 }
        );
        assert_eq!(
            negotiate((DialectKind::Mysql, "datetime(6)"), (DialectKind::Mssql, "datetime2")),
            NormalizeRule::Timestamp { precision: 6 }
        );

        // Types with no implied precision fall back to the configured default.
        let mut overridden = NormalizationRegistry::builtin();
        overridden.register(DialectKind::Postgres, "timestamptz", TypeCategory::Timestamp);
        let rule = negotiate_rule(
            &overridden,
            (DialectKind::Postgres, &col("ts", "timestamptz")),
            (DialectKind::Postgres, &col("ts", "timestamptz")),
            4,
        )
        .unwrap();
        assert_eq!(rule, NormalizeRule::Timestamp { precision: 4 });
    }
}
