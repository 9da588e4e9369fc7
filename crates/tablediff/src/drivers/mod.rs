//! Database adapters.
//!
//! Real engines are [`SqlDatabase`]s pairing a [`DialectImpl`] with a pooled
//! executor. [`MemoryDatabase`] implements [`Database`] directly.

mod memory;
mod mssql;
mod mysql;
mod postgres;
mod sql;
mod tls;

pub use memory::MemoryDatabase;
pub use mssql::MssqlExecutor;
pub use mysql::MysqlExecutor;
pub use postgres::PgExecutor;
pub use sql::SqlDatabase;
pub use tls::{SslMode, TlsBuilder};

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::core::Database;
use crate::dialect::{Dialect, DialectImpl, DialectKind};
use crate::error::Result;

/// Open a pooled connection to the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Database>> {
    let dialect = DialectImpl::from_kind(config.r#type);
    let name = config.display_name();
    let max_conns = config.get_max_connections();

    let db: Arc<dyn Database> = match config.r#type {
        DialectKind::Postgres => Arc::new(SqlDatabase::new(
            PgExecutor::new(config, max_conns).await?,
            dialect,
            name,
        )),
        DialectKind::Mysql => {
            let setup = dialect.session_setup();
            Arc::new(SqlDatabase::new(
                MysqlExecutor::new(config, max_conns, setup).await?,
                dialect,
                name,
            ))
        }
        DialectKind::Mssql => Arc::new(SqlDatabase::new(
            MssqlExecutor::new(config, max_conns).await?,
            dialect,
            name,
        )),
    };

    Ok(db)
}
