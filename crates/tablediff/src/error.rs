//! Error types for the diff library.

use thiserror::Error;

/// Exit code for a run that found no differences.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for configuration errors (invalid YAML, unsupported types, ...).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for query or connection failures.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
/// Exit code for a completed run that found differences.
pub const EXIT_DIFFERENCES_FOUND: u8 = 3;
/// Exit code for a run interrupted by a signal.
pub const EXIT_CANCELLED: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for diff operations.
#[derive(Error, Debug)]
pub enum DiffError {
    /// Configuration error (invalid YAML, unsupported column type, incompatible keys, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL connection or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL connection or query error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// SQL Server connection or query error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A query returned something the engine cannot interpret
    #[error("Query failed on {database}: {message}")]
    Query { database: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Diff was cancelled (SIGINT, etc.)
    #[error("Diff cancelled")]
    Cancelled,
}

impl DiffError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        DiffError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Query error for the named database
    pub fn query(database: impl Into<String>, message: impl Into<String>) -> Self {
        DiffError::Query {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Whether this error was caused by a database round-trip rather than by configuration.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DiffError::Postgres(_)
                | DiffError::Mysql(_)
                | DiffError::Mssql(_)
                | DiffError::Pool { .. }
                | DiffError::Query { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DiffError::Config(_) | DiffError::Yaml(_) | DiffError::Json(_) => EXIT_CONFIG_ERROR,
            DiffError::Io(_) => EXIT_IO_ERROR,
            DiffError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_CONNECTIVITY_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for diff operations.
pub type Result<T> = std::result::Result<T, DiffError>;
