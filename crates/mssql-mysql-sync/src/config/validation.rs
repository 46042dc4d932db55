//! Configuration validation.
//!
//! Everything here runs without a database connection.

use std::collections::HashSet;

use super::{SourceConfig, SyncConfig, TableSyncSpec, TargetConfig};
use crate::core::identifier::{validate_identifier, validate_sql_fragment};
use crate::error::{Result, SyncError};

/// Validate the connection settings.
pub fn validate_connections(source: &SourceConfig, target: &TargetConfig) -> Result<()> {
    if source.host.is_empty() {
        return Err(SyncError::config("source host is required (MSSQL_HOST)"));
    }
    if source.database.is_empty() {
        return Err(SyncError::config("source database is required (MSSQL_DB)"));
    }
    if source.user.is_empty() {
        return Err(SyncError::config("source user is required (MSSQL_USER)"));
    }
    validate_identifier(&source.schema)?;

    if target.host.is_empty() {
        return Err(SyncError::config("target host is required (MYSQL_HOST)"));
    }
    if target.database.is_empty() {
        return Err(SyncError::config("target database is required (MYSQL_DB)"));
    }
    if target.user.is_empty() {
        return Err(SyncError::config("target user is required (MYSQL_USER)"));
    }
    validate_identifier(&target.database)?;

    match target.ssl_mode.to_lowercase().as_str() {
        "disable" | "prefer" | "require" | "verify_ca" | "verify-ca" | "verify_identity"
        | "verify-full" => Ok(()),
        other => Err(SyncError::config(format!(
            "unknown MySQL ssl mode '{}' (expected disable, prefer, require, verify_ca or verify_identity)",
            other
        ))),
    }
}

/// Validate the sync file as a whole, including every table entry.
pub fn validate(config: &SyncConfig) -> Result<()> {
    if let Some(0) = config.frequency {
        return Err(SyncError::config("frequency must be at least 1 second"));
    }

    if config.tables.is_empty() {
        return Err(SyncError::config("no tables configured"));
    }

    for name in &config.audit_columns {
        validate_identifier(name)?;
    }

    for (idx, table) in config.tables.iter().enumerate() {
        validate_table(table).map_err(|e| match e {
            SyncError::Config(msg) => {
                SyncError::Config(format!("tables[{}] ({}): {}", idx, table.label(), msg))
            }
            other => other,
        })?;
    }

    Ok(())
}

/// Validate one table entry.
pub fn validate_table(spec: &TableSyncSpec) -> Result<()> {
    validate_identifier(&spec.source_table)?;
    if let Some(schema) = &spec.source_schema {
        validate_identifier(schema)?;
    }

    if spec.table_as_is {
        if let Some(target) = &spec.target_table {
            validate_identifier(target)?;
        }
    } else {
        match spec.target_table.as_deref() {
            Some(target) if !target.is_empty() => validate_identifier(target)?,
            _ => {
                return Err(SyncError::config(
                    "target_table must be specified because table_as_is = 0",
                ))
            }
        }
    }

    let id_column = match spec.id_column.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Err(SyncError::config("id_column is required")),
    };
    validate_identifier(id_column)?;

    if let Some(target_id) = &spec.target_id {
        validate_identifier(target_id)?;
    }

    if !spec.column_as_is {
        let columns = match &spec.columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => {
                return Err(SyncError::config(
                    "columns must be specified because column_as_is = 0",
                ))
            }
        };

        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for (source, target) in columns {
            validate_identifier(source)?;
            validate_identifier(target)?;
            if !sources.insert(source.to_lowercase()) {
                return Err(SyncError::config(format!(
                    "source column '{}' is mapped more than once",
                    source
                )));
            }
            if !targets.insert(target.to_lowercase()) {
                return Err(SyncError::config(format!(
                    "target column '{}' is mapped more than once",
                    target
                )));
            }
        }

        let id_mapped = columns.keys().any(|c| c.eq_ignore_ascii_case(id_column));
        if !id_mapped && spec.target_id.is_none() {
            return Err(SyncError::config(format!(
                "id_column '{}' is not one of the mapped columns",
                id_column
            )));
        }
    }

    if let Some(conditions) = &spec.conditions {
        validate_sql_fragment(conditions)?;
    }
    if let Some(query) = &spec.query {
        validate_sql_fragment(query)?;
    }

    Ok(())
}
