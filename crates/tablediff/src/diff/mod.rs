//! Bisection differ.
//!
//! [`TableDiffer::diff_tables`] validates both segments, negotiates one
//! normalization rule per column pair and returns a lazy [`DiffStream`].
//! The stream walks the key domain with an explicit worklist:
//!
//! 1. **Root**: count both sides (or discover key bounds for an unbounded root).
//! 2. **Checksum**: compare count and checksum of a sub-range on both sides;
//!    a match prunes it.
//! 3. **Expand**: a mismatching range is split into `bisection_factor`
//!    children, sampled at observed keys when it holds fewer rows than that,
//!    materialized once at most `bisection_threshold` rows remain, or drained
//!    page by page when only one side has rows.
//! 4. **Materialize**: fetch both sides in key order and merge.
//!
//! Work happens only while the stream is polled, and at most
//! `max_concurrency` tasks are in flight. Ranges are scheduled in ascending
//! key order.

mod rows;
mod stats;
mod types;

pub use rows::diff_rows;
pub use stats::{DiffStats, Statistics};
pub use types::{DiffEvent, DiffKind, Row};

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::{ready, FutureExt};
use tracing::{debug, info, warn};

use crate::core::KeyRange;
use crate::error::{DiffError, Result};
use crate::normalize::{
    negotiate_rule, ColumnPlan, NormalizationRegistry, SegmentPlan, DEFAULT_TIMESTAMP_PRECISION,
    MAX_TIMESTAMP_PRECISION,
};
use crate::segment::{check_key, TableSegment};
use crate::split::{split_at_keys, split_range};

/// Compares two tables by recursive checksum bisection.
///
/// Both tables should be quiescent for the duration of a diff: every query
/// reads the live tables and no snapshot spans the run.
#[derive(Debug, Clone)]
pub struct TableDiffer {
    bisection_threshold: usize,
    bisection_factor: usize,
    max_concurrency: usize,
    registry: Arc<NormalizationRegistry>,
    timestamp_precision: u32,
    stats: Statistics,
}

impl TableDiffer {
    /// # Errors
    ///
    /// `DiffError::Config` unless `bisection_threshold >= 1`,
    /// `bisection_factor >= 2` and `max_concurrency >= 1`.
    pub fn new(
        bisection_threshold: usize,
        bisection_factor: usize,
        max_concurrency: usize,
    ) -> Result<Self> {
        if bisection_threshold < 1 {
            return Err(DiffError::Config(
                "bisection_threshold must be at least 1".into(),
            ));
        }
        if bisection_factor < 2 {
            return Err(DiffError::Config(
                "bisection_factor must be at least 2".into(),
            ));
        }
        if max_concurrency < 1 {
            return Err(DiffError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }

        Ok(Self {
            bisection_threshold,
            bisection_factor,
            max_concurrency,
            registry: Arc::new(NormalizationRegistry::builtin()),
            timestamp_precision: DEFAULT_TIMESTAMP_PRECISION,
            stats: Statistics::new(),
        })
    }

    /// Resolve column types through `registry` instead of the built-in one.
    pub fn with_registry(mut self, registry: NormalizationRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Precision assumed for timestamps whose declaration and type imply none.
    pub fn with_timestamp_precision(mut self, precision: u32) -> Result<Self> {
        if precision > MAX_TIMESTAMP_PRECISION {
            return Err(DiffError::Config(format!(
                "timestamp_precision must be between 0 and {}, got {}",
                MAX_TIMESTAMP_PRECISION, precision
            )));
        }
        self.timestamp_precision = precision;
        Ok(self)
    }

    /// Counters of the most recent diff.
    pub fn statistics(&self) -> DiffStats {
        self.stats.snapshot()
    }

    /// Validate both segments and return a lazy stream of differences.
    ///
    /// Events for keys only in `a` are `removed`, only in `b` are `added`.
    ///
    /// # Errors
    ///
    /// `DiffError::Config` for mismatched column counts, missing columns,
    /// unsupported or incompatible types, non-integer keys, or explicit key
    /// ranges that differ. Catalog lookups may also fail with connectivity errors.
    pub async fn diff_tables(&self, a: &TableSegment, b: &TableSegment) -> Result<DiffStream> {
        self.stats.reset();

        if a.columns().len() != b.columns().len() {
            return Err(DiffError::Config(format!(
                "{} compares {} columns but {} compares {}",
                a,
                a.columns().len(),
                b,
                b.columns().len()
            )));
        }

        self.stats.add_queries(2);
        let (schema_a, schema_b) = futures::try_join!(a.describe(), b.describe())?;
        check_key(&self.registry, a.database().as_ref(), &schema_a.key)?;
        check_key(&self.registry, b.database().as_ref(), &schema_b.key)?;

        let mut plan_a = Vec::with_capacity(schema_a.columns.len());
        let mut plan_b = Vec::with_capacity(schema_b.columns.len());
        for (col_a, col_b) in schema_a.columns.iter().zip(&schema_b.columns) {
            let rule = negotiate_rule(
                &self.registry,
                (a.database().dialect(), col_a),
                (b.database().dialect(), col_b),
                self.timestamp_precision,
            )?;
            debug!("{} <-> {}: {}", col_a.name, col_b.name, rule);
            plan_a.push(ColumnPlan {
                name: col_a.name.clone(),
                rule,
            });
            plan_b.push(ColumnPlan {
                name: col_b.name.clone(),
                rule,
            });
        }

        let root = match (a.range(), b.range()) {
            (Some(ra), Some(rb)) if ra != rb => {
                return Err(DiffError::Config(format!(
                    "Segments cover different key ranges: {} vs {}",
                    ra, rb
                )))
            }
            (Some(r), _) | (None, Some(r)) => Some(r),
            (None, None) => None,
        };

        info!(
            "Diffing {} against {} ({} columns, threshold={}, factor={}, concurrency={})",
            a,
            b,
            plan_a.len(),
            self.bisection_threshold,
            self.bisection_factor,
            self.max_concurrency
        );

        let ctx = DiffContext {
            a: a.clone()
                .with_key_column(schema_a.key.name)
                .with_plan(Arc::new(SegmentPlan::new(plan_a))),
            b: b.clone()
                .with_key_column(schema_b.key.name)
                .with_plan(Arc::new(SegmentPlan::new(plan_b))),
            threshold: self.bisection_threshold,
            factor: self.bisection_factor,
            stats: self.stats.clone(),
        };

        Ok(DiffStream::new(
            Arc::new(ctx),
            Task::Root { range: root },
            self.max_concurrency,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// One pending unit of work. Each issues at most one query per side.
#[derive(Debug, Clone)]
enum Task {
    Root { range: Option<KeyRange> },
    Checksum { range: KeyRange, depth: u64 },
    Sample { range: KeyRange, depth: u64 },
    Materialize { range: KeyRange },
    Drain { range: KeyRange, side: Side },
}

/// Result of running a task: follow-up tasks in ascending key order, plus events.
#[derive(Default)]
struct Step {
    tasks: Vec<Task>,
    events: Vec<DiffEvent>,
}

impl Step {
    fn tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            events: Vec::new(),
        }
    }

    fn events(events: Vec<DiffEvent>) -> Self {
        Self {
            tasks: Vec::new(),
            events,
        }
    }
}

struct DiffContext {
    a: TableSegment,
    b: TableSegment,
    threshold: usize,
    factor: usize,
    stats: Statistics,
}

impl DiffContext {
    async fn run(&self, task: Task) -> Result<Step> {
        match task {
            Task::Root { range } => self.root(range).await,
            Task::Checksum { range, depth } => self.checksum(range, depth).await,
            Task::Sample { range, depth } => self.sample(range, depth).await,
            Task::Materialize { range } => self.materialize(range).await,
            Task::Drain { range, side } => self.drain(range, side).await,
        }
    }

    async fn root(&self, range: Option<KeyRange>) -> Result<Step> {
        self.stats.segment_compared();
        self.stats.add_queries(2);

        if let Some(range) = range {
            let (sa, sb) = self.sides(range);
            let (ca, cb) = futures::try_join!(sa.count(), sb.count())?;
            debug!("root {}: {} vs {} rows", range, ca, cb);
            return Ok(Step::tasks(self.expand(range, ca, cb, 0)));
        }

        let (ba, bb) = futures::try_join!(self.a.key_bounds(), self.b.key_bounds())?;
        let (ra, rb) = (ba.range()?, bb.range()?);
        let range = match (ra, rb) {
            (Some(ra), Some(rb)) => {
                if ra != rb {
                    warn!(
                        "Key bounds disagree: {} has {}, {} has {}; comparing the union",
                        self.a, ra, self.b, rb
                    );
                }
                ra.union(&rb)
            }
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => {
                debug!("both tables are empty");
                return Ok(Step::default());
            }
        };

        debug!("root {}: {} vs {} rows", range, ba.count, bb.count);
        Ok(Step::tasks(self.expand(range, ba.count, bb.count, 0)))
    }

    async fn checksum(&self, range: KeyRange, depth: u64) -> Result<Step> {
        self.stats.segment_compared();
        self.stats.reached_depth(depth);
        self.stats.add_queries(2);

        let (sa, sb) = self.sides(range);
        let (da, db) = futures::try_join!(sa.count_and_checksum(), sb.count_and_checksum())?;

        if da == db {
            debug!("{} at depth {}: {} rows match", range, depth, da.count);
            self.stats.add_rows_skipped(da.count);
            return Ok(Step::default());
        }

        debug!(
            "{} at depth {}: mismatch ({} vs {} rows)",
            range, depth, da.count, db.count
        );
        Ok(Step::tasks(self.expand(range, da.count, db.count, depth)))
    }

    /// Split a range holding fewer rows than the factor at keys seen on either side.
    async fn sample(&self, range: KeyRange, depth: u64) -> Result<Step> {
        self.stats.add_queries(2);
        let (sa, sb) = self.sides(range);
        let (ka, kb) = futures::try_join!(
            sa.sample_keys(self.factor),
            sb.sample_keys(self.factor)
        )?;

        let keys: Vec<i64> = ka.into_iter().chain(kb).collect();
        let parts = split_at_keys(range, &keys, self.factor);
        if parts.len() <= 1 {
            return Ok(Step::tasks(vec![Task::Materialize { range }]));
        }

        Ok(Step::tasks(
            parts
                .into_iter()
                .map(|range| Task::Checksum {
                    range,
                    depth: depth + 1,
                })
                .collect(),
        ))
    }

    async fn materialize(&self, range: KeyRange) -> Result<Step> {
        self.stats.add_queries(2);
        let (sa, sb) = self.sides(range);
        let (rows_a, rows_b) = futures::try_join!(sa.fetch_rows(None), sb.fetch_rows(None))?;

        self.stats
            .add_rows_inspected((rows_a.len() + rows_b.len()) as u64);
        let events = diff_rows(rows_a, rows_b);
        debug!("{} materialized: {} differences", range, events.len());
        Ok(Step::events(events))
    }

    /// Emit every row of a range present on one side only, one page at a time.
    async fn drain(&self, range: KeyRange, side: Side) -> Result<Step> {
        self.stats.add_queries(1);
        let segment = match side {
            Side::A => &self.a,
            Side::B => &self.b,
        };
        let rows = segment
            .with_range(range)
            .fetch_rows(Some(self.threshold))
            .await?;
        self.stats.add_rows_inspected(rows.len() as u64);

        let mut tasks = Vec::new();
        if rows.len() >= self.threshold {
            if let Some(next) = rows.last().and_then(|last| last.key.checked_add(1)) {
                let rest = range.starting_at(next);
                if !rest.is_empty() {
                    tasks.push(Task::Drain { range: rest, side });
                }
            }
        }

        let events = rows
            .into_iter()
            .map(|row| match side {
                Side::A => DiffEvent::removed(row),
                Side::B => DiffEvent::added(row),
            })
            .collect();
        Ok(Step { tasks, events })
    }

    fn sides(&self, range: KeyRange) -> (TableSegment, TableSegment) {
        (self.a.with_range(range), self.b.with_range(range))
    }

    /// Decide what to do with a range whose two sides differ.
    fn expand(&self, range: KeyRange, ca: u64, cb: u64, depth: u64) -> Vec<Task> {
        let max = ca.max(cb);
        if max == 0 {
            Vec::new()
        } else if ca == 0 {
            vec![Task::Drain {
                range,
                side: Side::B,
            }]
        } else if cb == 0 {
            vec![Task::Drain {
                range,
                side: Side::A,
            }]
        } else if max <= self.threshold as u64 || range.width() <= 1 {
            vec![Task::Materialize { range }]
        } else if max < self.factor as u64 {
            vec![Task::Sample { range, depth }]
        } else {
            split_range(range, self.factor)
                .into_iter()
                .map(|range| Task::Checksum {
                    range,
                    depth: depth + 1,
                })
                .collect()
        }
    }
}

/// Lazy stream of [`DiffEvent`]s.
///
/// Polling drives all work. Dropping the stream drops in-flight queries and
/// issues no new ones. The first error ends the stream.
pub struct DiffStream {
    ctx: Arc<DiffContext>,
    stack: Vec<Task>,
    in_flight: FuturesUnordered<BoxFuture<'static, Result<Step>>>,
    max_concurrency: usize,
    ready: VecDeque<DiffEvent>,
    finished: bool,
}

impl DiffStream {
    fn new(ctx: Arc<DiffContext>, root: Task, max_concurrency: usize) -> Self {
        Self {
            ctx,
            stack: vec![root],
            in_flight: FuturesUnordered::new(),
            max_concurrency,
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Counters of this run, readable at any time (also after an error).
    pub fn statistics(&self) -> DiffStats {
        self.ctx.stats.snapshot()
    }

    fn spawn(&mut self, task: Task) {
        let ctx = Arc::clone(&self.ctx);
        self.in_flight
            .push(async move { ctx.run(task).await }.boxed());
    }
}

impl Stream for DiffStream {
    type Item = Result<DiffEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.ready.pop_front() {
                this.ctx.stats.diff_emitted();
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            while this.in_flight.len() < this.max_concurrency {
                match this.stack.pop() {
                    Some(task) => this.spawn(task),
                    None => break,
                }
            }

            if this.in_flight.is_empty() {
                this.finished = true;
                info!("Diff complete: {}", this.ctx.stats.snapshot());
                continue;
            }

            match ready!(this.in_flight.poll_next_unpin(cx)) {
                Some(Ok(step)) => {
                    // Reversed so the lowest range is popped first.
                    this.stack.extend(step.tasks.into_iter().rev());
                    this.ready.extend(step.events);
                }
                Some(Err(e)) => {
                    this.stack.clear();
                    this.in_flight = FuturesUnordered::new();
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {}
            }
        }
    }
}
