//! Row hashing and order-independent segment checksums (protocol `sha256-60`).
//!
//! A row string is the key followed by each encoded field, joined with `|`.
//! Its hash is the last 15 hex digits (60 bits) of SHA-256 over the row string.
//! A segment checksum is the sum of its row hashes modulo 2^60, so it does not
//! depend on row order. The same arithmetic is rendered as SQL by each dialect.

use sha2::{Digest, Sha256};

use crate::core::RawRow;
use crate::error::Result;
use crate::normalize::{NormalizeRule, SegmentPlan};

/// Protocol identifier, logged at the start of a run.
pub const CHECKSUM_PROTOCOL: &str = "sha256-60";

/// Hex digits of the SHA-256 digest kept per row.
pub const CHECKSUM_HEX_DIGITS: usize = 15;

/// Width of a row hash and of a segment checksum.
pub const CHECKSUM_BITS: u32 = 60;

/// Modulus for segment aggregation (2^60).
pub const CHECKSUM_MODULUS: u64 = 1 << CHECKSUM_BITS;

/// Separator between encoded fields in a row string.
pub const FIELD_SEPARATOR: char = '|';

/// Encoding of SQL NULL in a row string.
pub const NULL_TOKEN: &str = "NULL";

/// Count and checksum of a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentDigest {
    pub count: u64,
    pub checksum: u64,
}

/// Build the row string from a key and already-normalized values.
pub fn row_string(key: i64, rules: &[NormalizeRule], normalized: &[Option<String>]) -> String {
    let mut row = key.to_string();
    for (rule, value) in rules.iter().zip(normalized) {
        row.push(FIELD_SEPARATOR);
        row.push_str(&rule.encode_normalized(value.as_deref()));
    }
    row
}

/// 60-bit hash of a row string.
pub fn row_hash(row: &str) -> u64 {
    let digest = Sha256::digest(row.as_bytes());
    // The last 15 hex digits are the low 60 bits of the trailing 8 bytes.
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[digest.len() - 8..]);
    u64::from_be_bytes(tail) & (CHECKSUM_MODULUS - 1)
}

/// Add a row hash into a running checksum.
#[inline]
pub fn accumulate(checksum: u64, hash: u64) -> u64 {
    (checksum + hash) % CHECKSUM_MODULUS
}

/// Normalize a fetched row according to the plan.
pub fn normalize_row(plan: &SegmentPlan, row: &RawRow) -> Result<Vec<Option<String>>> {
    plan.columns
        .iter()
        .zip(&row.values)
        .map(|(col, value)| col.rule.normalize(value))
        .collect()
}

/// Compute count and checksum in process over fetched rows.
pub fn digest_rows<'a>(
    plan: &SegmentPlan,
    rows: impl IntoIterator<Item = &'a RawRow>,
) -> Result<SegmentDigest> {
    let rules: Vec<NormalizeRule> = plan.rules().collect();
    let mut digest = SegmentDigest::default();
    for row in rows {
        let normalized = normalize_row(plan, row)?;
        let hash = row_hash(&row_string(row.key, &rules, &normalized));
        digest.count += 1;
        digest.checksum = accumulate(digest.checksum, hash);
    }
    Ok(digest)
}
