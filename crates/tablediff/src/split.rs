//! Deterministic key-range partitioning.

use crate::core::KeyRange;

/// Split `range` into at most `parts` contiguous ascending sub-ranges.
///
/// Sub-ranges have equal width except the last, which takes the remainder.
/// A range narrower than `parts` is split into unit ranges; an empty range
/// yields nothing.
pub fn split_range(range: KeyRange, parts: usize) -> Vec<KeyRange> {
    let width = range.width();
    if width <= 0 || parts == 0 {
        return Vec::new();
    }

    let n = (parts as i128).min(width);
    let step = width / n;
    let start = range.start as i128;

    (0..n)
        .map(|i| {
            let lo = start + i * step;
            let hi = if i == n - 1 { range.end } else { lo + step };
            // `lo` lies below `range.end`, so it fits in a key.
            KeyRange {
                start: lo as i64,
                end: hi,
            }
        })
        .collect()
}

/// Split `range` at observed keys so that every sub-range holds at least one of them.
///
/// `keys` are the distinct keys seen on either side. When there are more than
/// `parts` of them, split points are picked evenly from the sorted list.
pub fn split_at_keys(range: KeyRange, keys: &[i64], parts: usize) -> Vec<KeyRange> {
    let mut keys: Vec<i64> = keys.iter().copied().filter(|k| range.contains(*k)).collect();
    keys.sort_unstable();
    keys.dedup();

    if keys.is_empty() || parts == 0 {
        return Vec::new();
    }

    let n = parts.min(keys.len());
    let mut starts = Vec::with_capacity(n);
    starts.push(range.start);
    for i in 1..n {
        starts.push(keys[i * keys.len() / n]);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &lo)| KeyRange {
            start: lo,
            end: starts
                .get(i + 1)
                .map_or(range.end, |&next| next as i128),
        })
        .collect()
}
