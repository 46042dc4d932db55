//! MySQL target writer.
//!
//! Uses mysql_async for connection pooling. Each sync cycle checks out one
//! [`MysqlSession`] with autocommit off; DML becomes visible at
//! [`TargetWriter::commit`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Value};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dialect::{MysqlDialect, Statement};
use crate::config::TargetConfig;
use crate::core::schema::IdValue;
use crate::core::traits::{Field, Row, TargetColumn, TargetWriter};
use crate::core::value::{format_datetime_offset, parse_datetime_offset, round_to_micros, SqlValue};
use crate::error::{Result, SyncError};
use crate::typemap::SourceType;

/// Connections kept by the target pool. One is in use per cycle.
const MAX_CONNECTIONS: usize = 2;

/// Pool of connections to the target database.
pub struct MysqlTarget {
    pool: Pool,
    dialect: MysqlDialect,
}

impl MysqlTarget {
    /// Create the pool and verify one connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to prefer",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.port)
            .db_name(Some(config.database.as_str()))
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()))
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, MAX_CONNECTIONS)
            .ok_or_else(|| SyncError::config("invalid MySQL pool constraints"))?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| SyncError::pool(e, "creating MySQL target pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| SyncError::pool(e, "testing MySQL target connection"))?;
        drop(conn);

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(config.database.clone()),
        })
    }

    /// Check out a connection for one cycle, with autocommit off.
    pub async fn session(&self) -> Result<MysqlSession> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| SyncError::pool(e, "getting MySQL connection"))?;
        conn.query_drop("SET autocommit = 0")
            .await
            .map_err(|e| SyncError::pool(e, "disabling autocommit"))?;
        Ok(MysqlSession {
            conn,
            dialect: self.dialect.clone(),
        })
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        if let Err(e) = self.pool.disconnect().await {
            debug!("MySQL pool disconnect: {}", e);
        }
    }
}

/// One checked-out target connection. Returned to the pool on drop.
pub struct MysqlSession {
    conn: Conn,
    dialect: MysqlDialect,
}

impl MysqlSession {
    /// Run a DDL statement over the text protocol.
    async fn execute_ddl(&mut self, table: &str, stmt: Statement) -> Result<()> {
        info!("{}", stmt.sql);
        self.conn
            .query_drop(stmt.sql.as_str())
            .await
            .map_err(|e| statement_error(table, &stmt.sql, e))
    }

    /// Run a DML statement with bound parameters.
    async fn execute(&mut self, table: &str, stmt: Statement) -> Result<()> {
        let rendered = stmt.render();
        info!("{}", rendered);
        self.conn
            .exec_drop(stmt.sql.as_str(), to_params(&stmt.params))
            .await
            .map_err(|e| statement_error(table, &rendered, e))
    }

    /// Run a SELECT and decode every row against `fields`.
    async fn select(&mut self, table: &str, stmt: Statement, fields: &[Field]) -> Result<Vec<Row>> {
        let rendered = stmt.render();
        debug!("{}", rendered);
        let rows: Vec<mysql_async::Row> = self
            .conn
            .exec(stmt.sql.as_str(), to_params(&stmt.params))
            .await
            .map_err(|e| statement_error(table, &rendered, e))?;

        rows.into_iter()
            .map(|mut row| {
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let value: Value = row.take(i).unwrap_or(Value::NULL);
                        decode_value(value, field)
                    })
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}

#[async_trait]
impl TargetWriter for MysqlSession {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let stmt = self.dialect.table_exists(table);
        let count: Option<i64> = self
            .conn
            .exec_first(stmt.sql.as_str(), to_params(&stmt.params))
            .await
            .map_err(|e| statement_error(table, &stmt.render(), e))?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        let stmt = self.dialect.column_names(table);
        let names: Vec<String> = self
            .conn
            .exec(stmt.sql.as_str(), to_params(&stmt.params))
            .await
            .map_err(|e| statement_error(table, &stmt.render(), e))?;
        Ok(names)
    }

    async fn create_table(
        &mut self,
        table: &str,
        columns: &[TargetColumn],
        primary_key: Option<&str>,
    ) -> Result<()> {
        let stmt = self.dialect.create_table(table, columns, primary_key)?;
        self.execute_ddl(table, stmt).await
    }

    async fn add_column(&mut self, table: &str, column: &TargetColumn) -> Result<()> {
        let stmt = self.dialect.add_column(table, column)?;
        self.execute_ddl(table, stmt).await
    }

    async fn set_auto_increment(&mut self, table: &str, seed: i64) -> Result<()> {
        let stmt = self.dialect.set_auto_increment(table, seed)?;
        self.execute_ddl(table, stmt).await
    }

    async fn fetch_ids(&mut self, table: &str, id: &Field) -> Result<Vec<IdValue>> {
        let stmt = self.dialect.select_ids(table, id)?;
        let rows = self.select(table, stmt, std::slice::from_ref(id)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(IdValue::from_sql_value))
            .collect())
    }

    async fn fetch_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>> {
        let stmt = self.dialect.select_row(table, id_column, id, fields)?;
        Ok(self.select(table, stmt, fields).await?.into_iter().next())
    }

    async fn delete_row(&mut self, table: &str, id_column: &str, id: &IdValue) -> Result<()> {
        let stmt = self.dialect.delete(table, id_column, id)?;
        self.execute(table, stmt).await
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        let stmt = self.dialect.insert(table, columns, values)?;
        self.execute(table, stmt).await
    }

    async fn update_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        assignments: &[(String, SqlValue)],
    ) -> Result<()> {
        let stmt = self.dialect.update(table, id_column, id, assignments)?;
        self.execute(table, stmt).await
    }

    async fn commit(&mut self) -> Result<()> {
        debug!("COMMIT");
        self.conn
            .query_drop("COMMIT")
            .await
            .map_err(|e| statement_error(self.dialect.database(), "COMMIT", e))
    }
}

/// Keep I/O failures as connection errors; everything else names the statement.
fn statement_error(table: &str, statement: &str, error: mysql_async::Error) -> SyncError {
    match error {
        mysql_async::Error::Io(_) => SyncError::Target(error),
        other => SyncError::statement(table, statement, other),
    }
}

fn to_params(values: &[SqlValue]) -> Vec<Value> {
    values.iter().map(sql_value_to_mysql).collect()
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I16(i) => Value::Int(i64::from(*i)),
        SqlValue::I32(i) => Value::Int(i64::from(*i)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F32(f) => Value::Float(*f),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.hyphenated().to_string().into_bytes()),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::DateTime(dt) => {
            let dt = round_to_micros(*dt);
            Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1_000,
            )
        }
        SqlValue::DateTimeOffset(dto) => Value::Bytes(format_datetime_offset(dto).into_bytes()),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond().min(999_999_999) / 1_000,
        ),
    }
}

/// Decode a target value into the shape the source side produces for the
/// same column, so the two compare directly.
fn decode_value(value: Value, field: &Field) -> Result<SqlValue> {
    let column = field.name.as_str();
    if matches!(value, Value::NULL) {
        return Ok(SqlValue::Null);
    }

    let decoded = match field.source_type {
        SourceType::BigInt | SourceType::Int | SourceType::SmallInt | SourceType::TinyInt => {
            SqlValue::I64(to_i64(value, column)?)
        }
        SourceType::Bit => SqlValue::Bool(to_i64(value, column)? != 0),
        SourceType::Float => SqlValue::F64(to_f64(value, column)?),
        SourceType::Real => match value {
            Value::Float(f) => SqlValue::F32(f),
            other => SqlValue::F32(to_f64(other, column)? as f32),
        },
        SourceType::Decimal
        | SourceType::Numeric
        | SourceType::Money
        | SourceType::SmallMoney => SqlValue::Decimal(to_decimal(value, column)?),
        SourceType::VarChar
        | SourceType::NVarChar
        | SourceType::Char
        | SourceType::NChar
        | SourceType::Text
        | SourceType::NText
        | SourceType::Xml => SqlValue::Text(to_string(value, column)?),
        SourceType::UniqueIdentifier => {
            let text = to_string(value, column)?;
            match Uuid::parse_str(text.trim()) {
                Ok(u) => SqlValue::Uuid(u),
                Err(_) => SqlValue::Text(text),
            }
        }
        SourceType::DateTimeOffset => {
            let text = to_string(value, column)?;
            match parse_datetime_offset(&text) {
                Some(dto) => SqlValue::DateTimeOffset(dto),
                None => SqlValue::Text(text),
            }
        }
        SourceType::Binary | SourceType::VarBinary | SourceType::Image => match value {
            Value::Bytes(b) => SqlValue::Bytes(b),
            other => return Err(unexpected(column, &other)),
        },
        SourceType::Date => SqlValue::Date(to_datetime(value, column)?.date()),
        SourceType::DateTime2 | SourceType::DateTime | SourceType::SmallDateTime => {
            SqlValue::DateTime(to_datetime(value, column)?)
        }
        SourceType::Time => match value {
            Value::Time(false, 0, h, m, s, us) => SqlValue::Time(
                NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(m), u32::from(s), us)
                    .ok_or_else(|| SyncError::decode(column, "time out of range"))?,
            ),
            other => return Err(unexpected(column, &other)),
        },
    };
    Ok(decoded)
}

fn unexpected(column: &str, value: &Value) -> SyncError {
    SyncError::decode(column, format!("unexpected MySQL value {:?}", value))
}

fn to_i64(value: Value, column: &str) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::UInt(u) => i64::try_from(u).map_err(|e| SyncError::decode(column, e)),
        Value::Bytes(b) => String::from_utf8_lossy(&b)
            .trim()
            .parse()
            .map_err(|e| SyncError::decode(column, e)),
        other => Err(unexpected(column, &other)),
    }
}

fn to_f64(value: Value, column: &str) -> Result<f64> {
    match value {
        Value::Double(f) => Ok(f),
        Value::Float(f) => Ok(f64::from(f)),
        Value::Int(i) => Ok(i as f64),
        Value::Bytes(b) => String::from_utf8_lossy(&b)
            .trim()
            .parse()
            .map_err(|e| SyncError::decode(column, e)),
        other => Err(unexpected(column, &other)),
    }
}

fn to_decimal(value: Value, column: &str) -> Result<Decimal> {
    match value {
        Value::Bytes(b) => Decimal::from_str(String::from_utf8_lossy(&b).trim())
            .map_err(|e| SyncError::decode(column, e)),
        Value::Int(i) => Ok(Decimal::from(i)),
        Value::UInt(u) => Ok(Decimal::from(u)),
        Value::Double(f) => Decimal::try_from(f).map_err(|e| SyncError::decode(column, e)),
        other => Err(unexpected(column, &other)),
    }
}

fn to_string(value: Value, column: &str) -> Result<String> {
    match value {
        Value::Bytes(b) => String::from_utf8(b).map_err(|e| SyncError::decode(column, e)),
        other => Err(unexpected(column, &other)),
    }
}

fn to_datetime(value: Value, column: &str) -> Result<NaiveDateTime> {
    match value {
        Value::Date(y, mo, d, h, mi, s, us) => {
            NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d))
                .and_then(|date| {
                    date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                })
                .ok_or_else(|| SyncError::decode(column, "date out of range"))
        }
        other => Err(unexpected(column, &other)),
    }
}
