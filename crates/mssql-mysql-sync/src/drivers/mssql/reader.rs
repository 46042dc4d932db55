//! MSSQL source reader implementation.
//!
//! Uses Tiberius with bb8 connection pooling. A sync cycle checks out one
//! [`MssqlSession`] and reads every table through it.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dialect;
use crate::config::SourceConfig;
use crate::core::identifier::qualify_mssql;
use crate::core::schema::{IdValue, SourceColumn};
use crate::core::traits::{Field, Row, RowSource, SourceReader};
use crate::core::value::SqlValue;
use crate::error::{Result, SyncError};
use crate::typemap::SourceType;

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum connection lifetime (30 minutes).
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Connections kept by the source pool. One is in use per cycle.
const POOL_MAX_SIZE: u32 = 2;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
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
            .map_err(|e| io_error(e, "connecting"))?;
        tcp.set_nodelay(true).ok();

        // Keepalives catch connections dropped while the loop sleeps.
        let std_tcp = tcp.into_std().map_err(|e| io_error(e, "detaching socket"))?;
        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        let tcp = TcpStream::from_std(std_tcp).map_err(|e| io_error(e, "converting socket"))?;

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

/// Pool of connections to the source database.
pub struct MssqlSource {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlSource {
    /// Create the pool and verify one connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| SyncError::pool(e, "creating MSSQL connection pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| SyncError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// Check out a connection for one cycle.
    pub async fn session(&self) -> Result<MssqlSession<'_>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting MSSQL connection from pool"))?;
        Ok(MssqlSession { conn })
    }
}

/// One checked-out source connection. Returned to the pool on drop.
pub struct MssqlSession<'a> {
    conn: PooledConnection<'a, TiberiusConnectionManager>,
}

impl MssqlSession<'_> {
    /// Run `sql` with optional id binding and decode `fields` by name.
    ///
    /// `label` names the source in statement errors.
    async fn query_fields(
        &mut self,
        label: &str,
        sql: &str,
        id: Option<&IdValue>,
        fields: &[Field],
    ) -> Result<Vec<Row>> {
        debug!("{}", sql);
        let mut query = Query::new(sql);
        match id {
            Some(IdValue::Int(v)) => query.bind(*v),
            Some(IdValue::Uuid(v)) => query.bind(*v),
            Some(IdValue::String(v)) => query.bind(v.clone()),
            None => {}
        }

        let rows = query
            .query(&mut *self.conn)
            .await
            .map_err(|e| statement_error(label, sql, e))?
            .into_first_result()
            .await
            .map_err(|e| statement_error(label, sql, e))?;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let positions = locate(first.columns(), fields)?;

        rows.iter()
            .map(|row| {
                positions
                    .iter()
                    .zip(fields)
                    .map(|(idx, field)| decode_value(row, *idx, field))
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}

#[async_trait]
impl SourceReader for MssqlSession<'_> {
    async fn describe_table(&mut self, schema: &str, table: &str) -> Result<Vec<SourceColumn>> {
        let qualified = qualify_mssql(schema, table)?;
        let mut query = Query::new(dialect::DESCRIBE_TABLE);
        query.bind(schema);
        query.bind(table);
        query.bind(qualified.as_str());

        let rows = query
            .query(&mut *self.conn)
            .await
            .map_err(|e| statement_error(&qualified, dialect::DESCRIBE_TABLE, e))?
            .into_first_result()
            .await
            .map_err(|e| statement_error(&qualified, dialect::DESCRIBE_TABLE, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = get(&row, 0, "COLUMN_NAME")?.unwrap_or_default();
            let is_identity = get::<i32>(&row, 7, "IsIdentity")?.unwrap_or(0) == 1;
            columns.push(SourceColumn {
                name: name.to_string(),
                data_type: get::<&str>(&row, 1, "DATA_TYPE")?
                    .unwrap_or_default()
                    .to_string(),
                max_length: get(&row, 2, "CHARACTER_MAXIMUM_LENGTH")?,
                precision: get(&row, 3, "NUMERIC_PRECISION")?,
                scale: get(&row, 4, "NUMERIC_SCALE")?,
                datetime_precision: get(&row, 5, "DATETIME_PRECISION")?,
                is_nullable: get::<i32>(&row, 6, "IS_NULLABLE")?.unwrap_or(0) == 1,
                is_identity,
                identity_seed: if is_identity { get(&row, 8, "IDENT_SEED")? } else { None },
                identity_increment: if is_identity { get(&row, 9, "IDENT_INCR")? } else { None },
                ordinal_pos: get::<i32>(&row, 10, "ORDINAL_POSITION")?.unwrap_or(0),
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), qualified);
        Ok(columns)
    }

    async fn fetch_ids(&mut self, source: &RowSource, id: &Field) -> Result<Vec<IdValue>> {
        let sql = dialect::select_rows(source, std::slice::from_ref(id))?;
        let rows = self
            .query_fields(&source_label(source), &sql, None, std::slice::from_ref(id))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(IdValue::from_sql_value))
            .collect())
    }

    async fn fetch_rows(&mut self, source: &RowSource, fields: &[Field]) -> Result<Vec<Row>> {
        let sql = dialect::select_rows(source, fields)?;
        self.query_fields(&source_label(source), &sql, None, fields).await
    }

    async fn fetch_row_by_id(
        &mut self,
        schema: &str,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>> {
        let sql = dialect::select_by_id(schema, table, id_column, fields)?;
        let label = format!("{}.{}", schema, table);
        Ok(self
            .query_fields(&label, &sql, Some(id), fields)
            .await?
            .into_iter()
            .next())
    }
}

fn source_label(source: &RowSource) -> String {
    match source {
        RowSource::Table { schema, table, .. } => format!("{}.{}", schema, table),
        RowSource::Query(_) => "query".to_string(),
    }
}

/// Attach the failed statement to a source error.
///
/// Io errors stay `Source` so they still count as a lost connection.
fn statement_error(table: &str, sql: &str, error: tiberius::error::Error) -> SyncError {
    match error {
        tiberius::error::Error::Io { .. } => SyncError::Source(error),
        other => SyncError::statement(table, sql, other),
    }
}

/// Result-set position of every field, matched by name ignoring ASCII case.
fn locate(columns: &[tiberius::Column], fields: &[Field]) -> Result<Vec<usize>> {
    fields
        .iter()
        .map(|field| {
            columns
                .iter()
                .position(|c| c.name().eq_ignore_ascii_case(&field.name))
                .ok_or_else(|| SyncError::decode(&field.name, "column not in result set"))
        })
        .collect()
}

fn get<'a, T>(row: &'a tiberius::Row, idx: usize, column: &str) -> Result<Option<T>>
where
    T: FromSql<'a>,
{
    row.try_get::<T, usize>(idx)
        .map_err(|e| SyncError::decode(column, e))
}

/// Table mode selects money as DECIMAL. An operator query that leaves it
/// uncast yields a float, exact to about 15 significant digits.
fn decode_money(row: &tiberius::Row, idx: usize, column: &str) -> Result<Option<Decimal>> {
    if let Ok(value) = row.try_get::<Decimal, usize>(idx) {
        return Ok(value);
    }
    get::<f64>(row, idx, column)?
        .map(|f| money_from_float(f).map_err(|e| SyncError::decode(column, e)))
        .transpose()
}

fn money_from_float(f: f64) -> std::result::Result<Decimal, rust_decimal::Error> {
    Decimal::try_from(f).map(|d| d.round_dp(4))
}

/// Decode one value according to the field's source type.
fn decode_value(row: &tiberius::Row, idx: usize, field: &Field) -> Result<SqlValue> {
    let column = field.name.as_str();
    let value = match field.source_type {
        SourceType::Bit => get::<bool>(row, idx, column)?.map(SqlValue::Bool),
        SourceType::TinyInt => get::<u8>(row, idx, column)?.map(|v| SqlValue::I16(i16::from(v))),
        SourceType::SmallInt => get::<i16>(row, idx, column)?.map(SqlValue::I16),
        SourceType::Int => get::<i32>(row, idx, column)?.map(SqlValue::I32),
        SourceType::BigInt => get::<i64>(row, idx, column)?.map(SqlValue::I64),
        SourceType::Real => get::<f32>(row, idx, column)?.map(SqlValue::F32),
        SourceType::Float => get::<f64>(row, idx, column)?.map(SqlValue::F64),
        SourceType::Decimal | SourceType::Numeric => {
            get::<Decimal>(row, idx, column)?.map(SqlValue::Decimal)
        }
        SourceType::Money | SourceType::SmallMoney => {
            decode_money(row, idx, column)?.map(SqlValue::Decimal)
        }
        SourceType::UniqueIdentifier => get::<Uuid>(row, idx, column)?.map(SqlValue::Uuid),
        SourceType::Date => get::<NaiveDate>(row, idx, column)?.map(SqlValue::Date),
        SourceType::Time => get::<NaiveTime>(row, idx, column)?.map(SqlValue::Time),
        SourceType::DateTime | SourceType::DateTime2 | SourceType::SmallDateTime => {
            get::<NaiveDateTime>(row, idx, column)?.map(SqlValue::DateTime)
        }
        SourceType::DateTimeOffset => {
            get::<DateTime<FixedOffset>>(row, idx, column)?.map(SqlValue::DateTimeOffset)
        }
        SourceType::Binary | SourceType::VarBinary | SourceType::Image => {
            get::<&[u8]>(row, idx, column)?.map(|v| SqlValue::Bytes(v.to_vec()))
        }
        // MySQL drops CHAR padding on read; drop it here so ids agree.
        SourceType::Char | SourceType::NChar => get::<&str>(row, idx, column)?
            .map(|s| SqlValue::Text(s.trim_end_matches(' ').to_string())),
        SourceType::VarChar
        | SourceType::NVarChar
        | SourceType::Text
        | SourceType::NText
        | SourceType::Xml => get::<&str>(row, idx, column)?.map(|s| SqlValue::Text(s.to_string())),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_query_carries_statement_text() {
        let sql = "SELECT [Id] FROM [dbo].[Orders] WHERE (Status = )";
        let err = statement_error(
            "dbo.Orders",
            sql,
            tiberius::error::Error::Conversion("Incorrect syntax near ')'".into()),
        );
        assert_eq!(err.kind(), "statement_execution");
        assert!(!err.is_connection_lost());
        match err {
            SyncError::Statement {
                table,
                statement,
                message,
            } => {
                assert_eq!(table, "dbo.Orders");
                assert_eq!(statement, sql);
                assert!(message.contains("Incorrect syntax"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_failure_stays_connection_loss() {
        let err = statement_error(
            "dbo.Orders",
            "SELECT 1",
            tiberius::error::Error::Io {
                kind: std::io::ErrorKind::ConnectionReset,
                message: "reset by peer".into(),
            },
        );
        assert!(matches!(err, SyncError::Source(_)));
        assert!(err.is_connection_lost());
    }

    #[test]
    fn test_source_label() {
        let table = RowSource::Table {
            schema: "sales".into(),
            table: "Orders".into(),
            conditions: Some("Id > 3".into()),
        };
        assert_eq!(source_label(&table), "sales.Orders");
        assert_eq!(source_label(&RowSource::Query("SELECT 1".into())), "query");
    }

    #[test]
    fn test_uncast_money_keeps_four_places() {
        assert_eq!(money_from_float(12.345_67).unwrap(), Decimal::new(123_457, 4));
        assert_eq!(money_from_float(-0.5).unwrap(), Decimal::new(-5, 1));
    }
}
