//! MySQL/MariaDB executor backed by a SQLx pool.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row};
use tracing::info;

use super::tls::SslMode;
use crate::config::DatabaseConfig;
use crate::core::{SqlExecutor, SqlValue, TypeCategory};
use crate::error::{DiffError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled MySQL connections.
pub struct MysqlExecutor {
    pool: MySqlPool,
}

impl MysqlExecutor {
    /// Connect, running `session_setup` on every new connection.
    pub async fn new(
        config: &DatabaseConfig,
        max_conns: usize,
        session_setup: Option<&'static str>,
    ) -> Result<Self> {
        let ssl_mode = SslMode::parse(config.get_ssl_mode())?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.get_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode.to_mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if let Some(sql) = session_setup {
                        conn.execute(sql).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| DiffError::pool(e, "creating MySQL pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| DiffError::pool(e, "testing MySQL connection"))?;

        info!(
            "Connected to MySQL: {} (pool_size={})",
            config.display_name(),
            max_conns
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlExecutor for MysqlExecutor {
    async fn execute(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<Vec<SqlValue>>> {
        let rows: Vec<MySqlRow> = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(row, kinds)).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &MySqlRow, kinds: &[TypeCategory]) -> Result<Vec<SqlValue>> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| decode_cell(row, i, *kind))
        .collect()
}

fn decode_cell(row: &MySqlRow, i: usize, kind: TypeCategory) -> Result<SqlValue> {
    let value: SqlValue = match kind {
        TypeCategory::Integer => row.try_get::<Option<i64>, _>(i)?.into(),
        TypeCategory::Decimal => row.try_get::<Option<Decimal>, _>(i)?.into(),
        TypeCategory::Timestamp => row.try_get::<Option<NaiveDateTime>, _>(i)?.into(),
        // TINYINT(1) and BIT(1) both reach here
        TypeCategory::Boolean => match row.try_get::<Option<bool>, _>(i) {
            Ok(v) => v.into(),
            Err(_) => row.try_get::<Option<i64>, _>(i)?.map(|v| v != 0).into(),
        },
        // Stored as CHAR(36); the rule parses the text
        TypeCategory::Uuid | TypeCategory::Text => match row.try_get::<Option<String>, _>(i) {
            Ok(v) => v.into(),
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(i)?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .into(),
        },
    };
    Ok(value)
}
