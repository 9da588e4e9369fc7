//! Pinned canonical strings, hashes and per-engine SQL.
//!
//! The in-process side and the generated SQL must agree byte for byte, so
//! both are checked against fixed values instead of against each other.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tablediff::checksum::{accumulate, digest_rows, row_hash, row_string};
use tablediff::core::{RawRow, SqlValue};
use tablediff::dialect::{Dialect, DialectImpl, DialectKind};
use tablediff::normalize::{ColumnPlan, SegmentPlan};
use tablediff::NormalizeRule;

const TEXT_SAMPLE: &str = "Grüße, 世界|ok";
const TEXT_SAMPLE_SHA256: &str =
    "b8f809e629b05a157a1718000ca32b11b06915912853253befd061744c4f5394";

fn ts(hour: u32, min: u32, sec: u32, micros: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, 1)
        .unwrap()
        .and_hms_micro_opt(hour, min, sec, micros)
        .unwrap()
}

fn dec(s: &str) -> SqlValue {
    SqlValue::Decimal(Decimal::from_str(s).unwrap())
}

/// Rules of the pinned row, in column order.
fn rules() -> Vec<NormalizeRule> {
    vec![
        NormalizeRule::Integer,
        NormalizeRule::Decimal { scale: 2 },
        NormalizeRule::Decimal { scale: 0 },
        NormalizeRule::Timestamp { precision: 0 },
        NormalizeRule::Timestamp { precision: 3 },
        NormalizeRule::Timestamp { precision: 6 },
        NormalizeRule::Boolean,
        NormalizeRule::Uuid,
        NormalizeRule::Text,
        NormalizeRule::Text,
    ]
}

fn plan() -> SegmentPlan {
    SegmentPlan::new(
        rules()
            .into_iter()
            .enumerate()
            .map(|(i, rule)| ColumnPlan {
                name: format!("c{}", i),
                rule,
            })
            .collect(),
    )
}

fn pinned_row() -> RawRow {
    RawRow {
        key: -42,
        values: vec![
            SqlValue::I64(-9),
            dec("-12.349"),
            dec("-0.5"),
            SqlValue::DateTime(ts(15, 10, 4, 999_999)),
            SqlValue::DateTime(ts(15, 10, 5, 9_876)),
            SqlValue::DateTime(ts(15, 10, 1, 131_000)),
            SqlValue::Bool(false),
            SqlValue::Text("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11".to_string()),
            SqlValue::Text(TEXT_SAMPLE.to_string()),
            SqlValue::Null,
        ],
    }
}

fn null_row() -> RawRow {
    RawRow {
        key: 7,
        values: vec![SqlValue::Null; 10],
    }
}

const PINNED_ROW_STRING: &str = "-42|-9|-12.34|0|2022-01-01 15:10:04.000000|2022-01-01 15:10:05.009000|2022-01-01 15:10:01.131000|0|a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11|b8f809e629b05a157a1718000ca32b11b06915912853253befd061744c4f5394|NULL";
const PINNED_ROW_HASH: u64 = 1_137_359_384_000_335_924;
const NULL_ROW_STRING: &str = "7|NULL|NULL|NULL|NULL|NULL|NULL|NULL|NULL|NULL|NULL";
const NULL_ROW_HASH: u64 = 1_022_076_070_210_285_416;
const TWO_ROW_CHECKSUM: u64 = 1_006_513_949_603_774_364;

#[test]
fn test_edge_values_normalize_to_pinned_strings() {
    let cases: Vec<(NormalizeRule, SqlValue, Option<&str>)> = vec![
        (NormalizeRule::Integer, SqlValue::I64(i64::MIN), Some("-9223372036854775808")),
        (NormalizeRule::Decimal { scale: 2 }, dec("-12.349"), Some("-12.34")),
        (NormalizeRule::Decimal { scale: 2 }, dec("5"), Some("5.00")),
        (NormalizeRule::Decimal { scale: 0 }, dec("-0.5"), Some("0")),
        (NormalizeRule::Decimal { scale: 3 }, dec("-0.0004"), Some("0.000")),
        (
            NormalizeRule::Timestamp { precision: 0 },
            SqlValue::DateTime(ts(23, 59, 59, 999_999)),
            Some("2022-01-01 23:59:59.000000"),
        ),
        (
            NormalizeRule::Timestamp { precision: 3 },
            SqlValue::DateTime(ts(15, 10, 5, 9_876)),
            Some("2022-01-01 15:10:05.009000"),
        ),
        (
            NormalizeRule::Timestamp { precision: 6 },
            SqlValue::DateTime(ts(0, 0, 0, 1)),
            Some("2022-01-01 00:00:00.000001"),
        ),
        (NormalizeRule::Boolean, SqlValue::I64(2), Some("1")),
        (
            NormalizeRule::Uuid,
            SqlValue::Text(" A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11".to_string()),
            Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"),
        ),
        (NormalizeRule::Text, SqlValue::Text(TEXT_SAMPLE.to_string()), Some(TEXT_SAMPLE)),
        (NormalizeRule::Text, SqlValue::Null, None),
    ];

    for (rule, value, expected) in cases {
        let normalized = rule.normalize(&value).unwrap();
        assert_eq!(normalized.as_deref(), expected, "{} over {:?}", rule, value);
    }
}

#[test]
fn test_text_field_is_encoded_as_sha256_hex() {
    assert_eq!(
        NormalizeRule::Text.encode_normalized(Some(TEXT_SAMPLE)),
        TEXT_SAMPLE_SHA256
    );
    assert_eq!(NormalizeRule::Text.encode_normalized(None), "NULL");
    assert_eq!(NormalizeRule::Integer.encode_normalized(Some("-9")), "-9");
}

#[test]
fn test_pinned_row_string_and_hash() {
    let rules = rules();
    let normalized: Vec<Option<String>> = rules
        .iter()
        .zip(&pinned_row().values)
        .map(|(rule, value)| rule.normalize(value).unwrap())
        .collect();

    let row = row_string(-42, &rules, &normalized);
    assert_eq!(row, PINNED_ROW_STRING);
    assert_eq!(row_hash(&row), PINNED_ROW_HASH);
}

#[test]
fn test_all_null_row_string_and_hash() {
    let rules = rules();
    let row = row_string(7, &rules, &vec![None; rules.len()]);
    assert_eq!(row, NULL_ROW_STRING);
    assert_eq!(row_hash(&row), NULL_ROW_HASH);
}

#[test]
fn test_pinned_segment_checksum() {
    assert_eq!(accumulate(PINNED_ROW_HASH, NULL_ROW_HASH), TWO_ROW_CHECKSUM);

    let digest = digest_rows(&plan(), &[pinned_row(), null_row()]).unwrap();
    assert_eq!(digest.count, 2);
    assert_eq!(digest.checksum, TWO_ROW_CHECKSUM);

    // Order of rows does not matter.
    let reversed = digest_rows(&plan(), &[null_row(), pinned_row()]).unwrap();
    assert_eq!(reversed, digest);
}

fn expr(kind: DialectKind, rule: NormalizeRule) -> String {
    DialectImpl::from_kind(kind).normalize_expr("c", rule)
}

#[test]
fn test_postgres_normalize_sql() {
    let kind = DialectKind::Postgres;
    assert_eq!(expr(kind, NormalizeRule::Integer), "CAST(c AS TEXT)");
    assert_eq!(
        expr(kind, NormalizeRule::Decimal { scale: 2 }),
        "CAST(TRUNC(c, 2) AS TEXT)"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 6 }),
        "TO_CHAR(c, 'YYYY-MM-DD HH24:MI:SS.US')"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 3 }),
        "TO_CHAR(c, 'YYYY-MM-DD HH24:MI:SS') || '.' || SUBSTR(TO_CHAR(c, 'US'), 1, 3) || '000'"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 0 }),
        "TO_CHAR(c, 'YYYY-MM-DD HH24:MI:SS') || '.' || SUBSTR(TO_CHAR(c, 'US'), 1, 0) || '000000'"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Boolean),
        "CAST(CAST(c AS INTEGER) AS TEXT)"
    );
    assert_eq!(expr(kind, NormalizeRule::Uuid), "LOWER(CAST(c AS TEXT))");
    assert_eq!(
        DialectImpl::from_kind(kind).text_digest_expr("c"),
        "ENCODE(SHA256(CONVERT_TO(CAST(c AS TEXT), 'UTF8')), 'hex')"
    );
}

#[test]
fn test_mysql_normalize_sql() {
    let kind = DialectKind::Mysql;
    assert_eq!(expr(kind, NormalizeRule::Integer), "CAST(c AS CHAR)");
    assert_eq!(
        expr(kind, NormalizeRule::Decimal { scale: 2 }),
        "CAST(TRUNCATE(c, 2) AS CHAR)"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 6 }),
        "DATE_FORMAT(c, '%Y-%m-%d %H:%i:%s.%f')"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 3 }),
        "CONCAT(DATE_FORMAT(c, '%Y-%m-%d %H:%i:%s'), '.', SUBSTRING(DATE_FORMAT(c, '%f'), 1, 3), '000')"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 0 }),
        "CONCAT(DATE_FORMAT(c, '%Y-%m-%d %H:%i:%s'), '.', SUBSTRING(DATE_FORMAT(c, '%f'), 1, 0), '000000')"
    );
    assert_eq!(expr(kind, NormalizeRule::Boolean), "CAST((c <> 0) AS CHAR)");
    assert_eq!(expr(kind, NormalizeRule::Uuid), "LOWER(CAST(c AS CHAR))");
    assert_eq!(
        DialectImpl::from_kind(kind).text_digest_expr("c"),
        "SHA2(CONVERT(c USING utf8mb4), 256)"
    );
}

#[test]
fn test_mssql_normalize_sql() {
    let kind = DialectKind::Mssql;
    assert_eq!(expr(kind, NormalizeRule::Integer), "CAST(c AS VARCHAR(20))");
    assert_eq!(
        expr(kind, NormalizeRule::Decimal { scale: 2 }),
        "CAST(CAST(ROUND(c, 2, 1) AS DECIMAL(38, 2)) AS VARCHAR(64))"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 6 }),
        "CAST(FORMAT(c, 'yyyy-MM-dd HH:mm:ss.ffffff', 'en-US') AS VARCHAR(26))"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 3 }),
        "CAST(CONCAT(FORMAT(c, 'yyyy-MM-dd HH:mm:ss', 'en-US'), '.', LEFT(FORMAT(c, 'ffffff', 'en-US'), 3), '000') AS VARCHAR(26))"
    );
    assert_eq!(
        expr(kind, NormalizeRule::Timestamp { precision: 0 }),
        "CAST(CONCAT(FORMAT(c, 'yyyy-MM-dd HH:mm:ss', 'en-US'), '.', LEFT(FORMAT(c, 'ffffff', 'en-US'), 0), '000000') AS VARCHAR(26))"
    );
    assert_eq!(expr(kind, NormalizeRule::Boolean), "CAST(c AS VARCHAR(1))");
    assert_eq!(
        expr(kind, NormalizeRule::Uuid),
        "LOWER(CAST(c AS VARCHAR(36)))"
    );
}
