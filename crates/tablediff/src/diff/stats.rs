//! Run statistics shared between a differ and its streams.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    rows_inspected: AtomicU64,
    rows_skipped: AtomicU64,
    segments_compared: AtomicU64,
    max_depth: AtomicU64,
    queries_issued: AtomicU64,
    diffs_emitted: AtomicU64,
}

/// Thread-safe counters updated as a diff stream is consumed.
///
/// Cloning shares the counters; callers only ever read them through
/// [`Statistics::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    counters: Arc<Counters>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> DiffStats {
        let c = &self.counters;
        DiffStats {
            rows_inspected: c.rows_inspected.load(Ordering::Relaxed),
            rows_skipped: c.rows_skipped.load(Ordering::Relaxed),
            segments_compared: c.segments_compared.load(Ordering::Relaxed),
            max_depth: c.max_depth.load(Ordering::Relaxed),
            queries_issued: c.queries_issued.load(Ordering::Relaxed),
            diffs_emitted: c.diffs_emitted.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        let c = &self.counters;
        for counter in [
            &c.rows_inspected,
            &c.rows_skipped,
            &c.segments_compared,
            &c.max_depth,
            &c.queries_issued,
            &c.diffs_emitted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn add_rows_inspected(&self, rows: u64) {
        self.counters.rows_inspected.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn add_rows_skipped(&self, rows: u64) {
        self.counters.rows_skipped.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn segment_compared(&self) {
        self.counters.segments_compared.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reached_depth(&self, depth: u64) {
        self.counters.max_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub(crate) fn add_queries(&self, queries: u64) {
        self.counters.queries_issued.fetch_add(queries, Ordering::Relaxed);
    }

    pub(crate) fn diff_emitted(&self) {
        self.counters.diffs_emitted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Rows fetched to the client, both sides summed.
    pub rows_inspected: u64,
    /// Rows of sub-ranges pruned by a matching checksum.
    pub rows_skipped: u64,
    pub segments_compared: u64,
    /// Deepest bisection level reached; the root is 0.
    pub max_depth: u64,
    pub queries_issued: u64,
    pub diffs_emitted: u64,
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} diffs, {} rows inspected, {} rows skipped, {} segments compared, \
             max depth {}, {} queries",
            self.diffs_emitted,
            self.rows_inspected,
            self.rows_skipped,
            self.segments_compared,
            self.max_depth,
            self.queries_issued
        )
    }
}
