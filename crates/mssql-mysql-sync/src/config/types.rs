//! Configuration type definitions.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Poll interval used when neither the CLI/env nor the file sets one.
pub const DEFAULT_FREQUENCY_SECS: u64 = 60;

/// Audit-timestamp columns compared at whole-second granularity by default.
pub const DEFAULT_AUDIT_COLUMNS: &[&str] = &["CREATE_DATE", "MODIFY_DATE", "created_at", "modified_at"];

/// Source database (SQL Server) connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema used when a table entry names none (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Target database (MySQL) connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database that holds the target tables.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode: disable, prefer, require, verify_ca, verify_identity (default: prefer).
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// The sync configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between cycles. Overridden by `SYNC_FREQUENCY`/`--frequency`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,

    /// Columns compared at whole-second granularity.
    #[serde(default = "default_audit_columns")]
    pub audit_columns: Vec<String>,

    /// Tables to sync, processed in order.
    pub tables: Vec<TableSyncSpec>,
}

/// One configured table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSyncSpec {
    /// Source schema; falls back to the connection's default schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_schema: Option<String>,

    /// Source table name.
    pub source_table: String,

    /// Target table name. Required unless `table_as_is` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,

    /// Use the source table name on the target.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub table_as_is: bool,

    /// Map every live source column to a target column of the same name.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub column_as_is: bool,

    /// Source identifier column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,

    /// Target name of the identifier column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    /// Source column to target column, in order. Required unless `column_as_is` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<IndexMap<String, String>>,

    /// Raw row filter applied to source reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,

    /// Raw source query replacing table reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl TableSyncSpec {
    /// Source schema, or `default` when the entry names none.
    pub fn source_schema_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.source_schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
    }

    /// Human-readable name for logs.
    pub fn label(&self) -> String {
        match &self.source_schema {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.source_table),
            _ => self.source_table.clone(),
        }
    }
}

/// Accept `0`/`1` as well as `true`/`false`.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(de::Error::custom(format!(
            "expected 0, 1, true or false, got {}",
            other
        ))),
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}

fn default_audit_columns() -> Vec<String> {
    DEFAULT_AUDIT_COLUMNS.iter().map(|c| c.to_string()).collect()
}
