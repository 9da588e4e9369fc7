//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::dialect::DialectKind;
use crate::normalize::{TypeOverride, DEFAULT_TIMESTAMP_PRECISION};

/// Default maximum rows in a segment before it is split instead of fetched.
pub const DEFAULT_BISECTION_THRESHOLD: usize = 16_384;

/// Default number of sub-ranges per bisection level.
pub const DEFAULT_BISECTION_FACTOR: usize = 32;

/// Pool size used when neither configuration nor auto-tuning set one.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        Self {
            total_memory_gb: sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
            cpu_cores: sys.cpus().len(),
        }
    }

    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }

    /// Connection pool size for one side: two per core, between 2 and 32.
    pub fn pool_size(&self) -> usize {
        (self.cpu_cores * 2).clamp(2, 32)
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// First table (events only present here are `removed`).
    pub table1: TableConfig,

    /// Second table (events only present here are `added`).
    pub table2: TableConfig,

    /// Integer key column shared by both tables.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Bisection behavior.
    #[serde(default)]
    pub diff: DiffConfig,

    /// Additional `(dialect, type name) -> category` registry entries.
    #[serde(default)]
    pub type_overrides: Vec<TypeOverride>,
}

impl Config {
    /// Fill unset pool sizes and concurrency from the host's resources.
    pub fn with_auto_tuning(self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.with_resources(&resources)
    }

    /// Auto-tune against explicit resources.
    pub fn with_resources(mut self, resources: &SystemResources) -> Self {
        for db in [&mut self.table1.database, &mut self.table2.database] {
            if db.max_connections.is_none() {
                db.max_connections = Some(resources.pool_size());
            }
        }

        if self.diff.max_concurrency.is_none() {
            self.diff.max_concurrency = Some(
                self.table1
                    .database
                    .get_max_connections()
                    .min(self.table2.database.get_max_connections()),
            );
        }

        info!(
            "Auto-tuned config: table1_conns={}, table2_conns={}, max_concurrency={}",
            self.table1.database.get_max_connections(),
            self.table2.database.get_max_connections(),
            self.diff.get_max_concurrency(),
        );

        self
    }

    /// Key column for one side, falling back to the shared one.
    pub fn key_column_for<'a>(&'a self, table: &'a TableConfig) -> &'a str {
        table.key_column.as_deref().unwrap_or(&self.key_column)
    }
}

/// One side of the comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub database: DatabaseConfig,

    /// `table` or `schema.table`.
    pub table: String,

    /// Overrides the shared `key_column` for this side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,

    /// Compared columns, paired by position with the other side. Empty compares keys only.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Database connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Engine: `postgres`, `mysql` or `mssql`.
    pub r#type: DialectKind,

    pub host: String,

    /// Defaults to the engine's standard port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub database: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    /// PostgreSQL/MySQL TLS mode: disable, require, verify-ca, verify-full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,

    /// SQL Server encryption (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// SQL Server: trust the server certificate without validation.
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Pool size. Auto-tuned from CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl DatabaseConfig {
    pub fn get_port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type {
            DialectKind::Postgres => 5432,
            DialectKind::Mysql => 3306,
            DialectKind::Mssql => 1433,
        })
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(DEFAULT_POOL_SIZE)
    }

    /// TLS mode, with the engine's default when unset.
    pub fn get_ssl_mode(&self) -> &str {
        match (&self.ssl_mode, self.r#type) {
            (Some(mode), _) => mode,
            (None, DialectKind::Postgres) => "require",
            (None, _) => "prefer",
        }
    }

    /// Display name used in logs: `type://host:port/database`.
    pub fn display_name(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.r#type,
            self.host,
            self.get_port(),
            self.database
        )
    }
}

// Passwords never reach logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Bisection settings.
/// Optional fields distinguish "not set" (use default or auto-tuned value) from explicit values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bisection_threshold: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bisection_factor: Option<usize>,

    /// In-flight segment comparisons. Defaults to the smaller pool size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Fractional-second precision for timestamps whose declaration and type imply none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_precision: Option<u32>,
}

impl DiffConfig {
    pub fn get_bisection_threshold(&self) -> usize {
        self.bisection_threshold.unwrap_or(DEFAULT_BISECTION_THRESHOLD)
    }

    pub fn get_bisection_factor(&self) -> usize {
        self.bisection_factor.unwrap_or(DEFAULT_BISECTION_FACTOR)
    }

    pub fn get_max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn get_timestamp_precision(&self) -> u32 {
        self.timestamp_precision.unwrap_or(DEFAULT_TIMESTAMP_PRECISION)
    }
}

fn default_key_column() -> String {
    "id".to_string()
}

fn default_true_string() -> String {
    "true".to_string()
}
