//! PostgreSQL executor backed by a deadpool-postgres pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use tokio_postgres::{Config as PgConfig, Row};
use tracing::{info, warn};
use uuid::Uuid;

use super::tls::{SslMode, TlsBuilder};
use crate::config::DatabaseConfig;
use crate::core::{SqlExecutor, SqlValue, TypeCategory};
use crate::error::{DiffError, Result};

/// Pooled PostgreSQL connections.
pub struct PgExecutor {
    pool: Pool,
}

impl PgExecutor {
    pub async fn new(config: &DatabaseConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.get_port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("tablediff");

        let ssl_mode = SslMode::parse(config.get_ssl_mode())?;
        pg_config.ssl_mode(ssl_mode.to_postgres());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match TlsBuilder::new(ssl_mode).build()? {
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| DiffError::pool(e, "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| DiffError::pool(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {} (pool_size={})",
            config.display_name(),
            max_conns
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<Vec<SqlValue>>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DiffError::pool(e, "getting PostgreSQL connection"))?;

        let rows = client.query(sql, &[]).await?;
        rows.iter().map(|row| decode_row(row, kinds)).collect()
    }

    async fn close(&self) {
        self.pool.close();
    }
}

fn decode_row(row: &Row, kinds: &[TypeCategory]) -> Result<Vec<SqlValue>> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| decode_cell(row, i, *kind))
        .collect()
}

fn decode_cell(row: &Row, i: usize, kind: TypeCategory) -> Result<SqlValue> {
    let value: SqlValue = match kind {
        TypeCategory::Integer => row.try_get::<_, Option<i64>>(i)?.into(),
        TypeCategory::Decimal => row.try_get::<_, Option<Decimal>>(i)?.into(),
        TypeCategory::Timestamp => match row.try_get::<_, Option<NaiveDateTime>>(i) {
            Ok(v) => v.into(),
            // timestamptz only decodes as an instant
            Err(_) => row
                .try_get::<_, Option<DateTime<Utc>>>(i)?
                .map(|ts| ts.naive_utc())
                .into(),
        },
        TypeCategory::Boolean => row.try_get::<_, Option<bool>>(i)?.into(),
        TypeCategory::Uuid => row.try_get::<_, Option<Uuid>>(i)?.into(),
        TypeCategory::Text => row.try_get::<_, Option<String>>(i)?.into(),
    };
    Ok(value)
}
