//! Core abstractions shared by the diff engine and the adapters.
//!
//! - [`key`]: key ranges and table paths
//! - [`schema`]: column metadata and type categories
//! - [`value`]: raw values fetched from a database
//! - [`traits`]: the [`Database`] and [`SqlExecutor`] seams
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod key;
pub mod schema;
pub mod traits;
pub mod value;

pub use key::{KeyRange, TablePath};
pub use schema::{ColumnInfo, ColumnType, TypeCategory};
pub use traits::{Database, KeyBounds, Scan, SqlExecutor};
pub use value::{RawRow, SqlValue};
