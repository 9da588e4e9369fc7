//! SQL Server executor backed by a bb8 pool of tiberius clients.

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{Duration, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnType as TdsType, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::{SqlExecutor, SqlValue, TypeCategory};
use crate::error::{DiffError, Result};

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: DatabaseConfig,
}

impl TiberiusConnectionManager {
    fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.get_port());
        config.database(&self.config.database);
        config.application_name("tablediff");
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        // Encryption settings
        match self.config.encrypt.to_lowercase().as_str() {
            "false" | "no" | "0" | "disable" => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            _ => {
                if self.config.trust_server_cert {
                    config.trust_cert();
                }
                config.encryption(EncryptionLevel::Required);
            }
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled SQL Server connections.
pub struct MssqlExecutor {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlExecutor {
    pub async fn new(config: &DatabaseConfig, max_conns: usize) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_conns as u32)
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| DiffError::pool(e, "creating SQL Server pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| DiffError::pool(e, "testing SQL Server connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to SQL Server: {} (pool_size={})",
            config.display_name(),
            max_conns
        );

        Ok(Self { pool })
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| DiffError::pool(e, "getting SQL Server connection"))
    }
}

#[async_trait]
impl SqlExecutor for MssqlExecutor {
    async fn execute(&self, sql: &str, kinds: &[TypeCategory]) -> Result<Vec<Vec<SqlValue>>> {
        let mut client = self.get_client().await?;
        let rows = client.simple_query(sql).await?.into_first_result().await?;
        rows.iter().map(|row| decode_row(row, kinds)).collect()
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
        TypeCategory::Integer => row.try_get::<i64, _>(i)?.into(),
        TypeCategory::Decimal => row.try_get::<Decimal, _>(i)?.into(),
        TypeCategory::Timestamp => {
            let ts = row.try_get::<NaiveDateTime, _>(i)?;
            if is_legacy_datetime(row, i) {
                ts.map(round_to_millis).into()
            } else {
                ts.into()
            }
        }
        TypeCategory::Boolean => row.try_get::<bool, _>(i)?.into(),
        TypeCategory::Uuid => row.try_get::<Uuid, _>(i)?.into(),
        TypeCategory::Text => row.try_get::<&str, _>(i)?.into(),
    };
    Ok(value)
}

/// `datetime` and `smalldatetime` columns, which count 1/300 s ticks.
fn is_legacy_datetime(row: &Row, i: usize) -> bool {
    matches!(
        row.columns().get(i).map(|c| c.column_type()),
        Some(TdsType::Datetime | TdsType::Datetimen | TdsType::Datetime4)
    )
}

/// Round to the nearest millisecond, as SQL Server renders a `datetime`.
///
/// tiberius decodes a tick exactly (2 ticks = 6.666666 ms), while `FORMAT`
/// and `CONVERT` show `.007`.
fn round_to_millis(ts: NaiveDateTime) -> NaiveDateTime {
    let nanos = i64::from(ts.nanosecond());
    let rounded = (nanos + 500_000) / 1_000_000 * 1_000_000;
    ts + Duration::nanoseconds(rounded - nanos)
}
