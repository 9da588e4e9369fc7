//! # tablediff
//!
//! Find the rows that differ between two large tables, possibly on different
//! database engines, without transferring either table in full.
//!
//! - **Checksum bisection**: segments are compared by `COUNT` and a pushed-down
//!   checksum; only mismatching key ranges are split further
//! - **Cross-engine normalization**: integers, decimals, timestamps, booleans,
//!   UUIDs and text compare equal across PostgreSQL, MySQL and SQL Server
//! - **Lazy streaming**: differences are produced as the stream is polled,
//!   with bounded concurrency
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use tablediff::{drivers, Config, TableDiffer, TableSegment};
//!
//! #[tokio::main]
//! async fn main() -> tablediff::Result<()> {
//!     let config = Config::load("diff.yaml")?;
//!     let a = drivers::connect(&config.table1.database).await?;
//!     let b = drivers::connect(&config.table2.database).await?;
//!
//!     let seg_a = TableSegment::new(a, config.table1.table_path()?, "id", None, vec![])?;
//!     let seg_b = TableSegment::new(b, config.table2.table_path()?, "id", None, vec![])?;
//!
//!     let differ = TableDiffer::new(16_384, 32, 8)?;
//!     let mut diffs = differ.diff_tables(&seg_a, &seg_b).await?;
//!     while let Some(event) = diffs.try_next().await? {
//!         println!("{}", event);
//!     }
//!     println!("{}", differ.statistics());
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod core;
pub mod dialect;
pub mod diff;
pub mod drivers;
pub mod error;
pub mod normalize;
pub mod segment;
pub mod split;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, DiffConfig, TableConfig};
pub use core::{Database, KeyRange, TablePath};
pub use diff::{DiffEvent, DiffKind, DiffStats, DiffStream, TableDiffer};
pub use drivers::MemoryDatabase;
pub use error::{DiffError, Result};
pub use normalize::{NormalizationRegistry, NormalizeRule};
pub use segment::TableSegment;
