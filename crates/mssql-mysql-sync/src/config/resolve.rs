//! Resolution of a configured table entry against the live source catalog.

use indexmap::IndexMap;
use tracing::warn;

use super::TableSyncSpec;
use crate::core::identifier::trim_statement;
use crate::core::schema::SourceColumn;
use crate::core::traits::RowSource;
use crate::error::{Result, SyncError};

/// Ordered source column to target column mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: IndexMap<String, String>,
}

impl ColumnMapping {
    /// Every column maps to itself.
    pub fn identity<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|n| (n.to_string(), n.to_string()))
                .collect(),
        }
    }

    /// Build from explicit pairs.
    pub fn from_pairs(entries: IndexMap<String, String>) -> Self {
        Self { entries }
    }

    /// Iterate `(source, target)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source-side key matching `source`, ignoring ASCII case.
    pub fn source_key(&self, source: &str) -> Option<&str> {
        self.entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(source))
            .map(String::as_str)
    }

    /// Target name for a source column, ignoring ASCII case.
    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.source_key(source)
            .and_then(|k| self.entries.get(k))
            .map(String::as_str)
    }

    /// Point `source` at `target`, inserting it first when absent.
    fn rename_or_prepend(&mut self, source: &str, target: &str) {
        match self.source_key(source).map(str::to_string) {
            Some(key) => {
                self.entries.insert(key, target.to_string());
            }
            None => {
                self.entries
                    .shift_insert(0, source.to_string(), target.to_string());
            }
        }
    }
}

/// A table entry with every flag applied.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub source_schema: String,
    pub source_table: String,
    pub target_table: String,
    pub columns: ColumnMapping,
    /// Source id column, as spelled in the mapping.
    pub id_column: String,
    /// Target id column used for lookups, deletes and updates.
    pub target_id_column: String,
    pub row_source: RowSource,
    /// Live source catalog read for this cycle.
    pub source_columns: Vec<SourceColumn>,
}

impl ResolvedTable {
    /// `schema.table` of the source, for logs and errors.
    pub fn source_name(&self) -> String {
        format!("{}.{}", self.source_schema, self.source_table)
    }

    /// Whether rows come from an operator query.
    pub fn is_query_mode(&self) -> bool {
        matches!(self.row_source, RowSource::Query(_))
    }
}

/// Resolve `spec` against the live source columns.
///
/// `default_schema` applies when the entry names no source schema.
///
/// # Errors
///
/// Returns `SyncError::Config` for entries that fail static validation or
/// whose id column is not part of the effective mapping.
pub fn resolve(
    spec: &TableSyncSpec,
    default_schema: &str,
    live_source_columns: Vec<SourceColumn>,
) -> Result<ResolvedTable> {
    spec.validate()?;

    let source_schema = spec.source_schema_or(default_schema).to_string();
    let label = format!("{}.{}", source_schema, spec.source_table);

    let target_table = if spec.table_as_is {
        if let Some(configured) = &spec.target_table {
            if configured != &spec.source_table {
                warn!(
                    "{}: table_as_is = 1, ignoring target_table '{}'",
                    label, configured
                );
            }
        }
        spec.source_table.clone()
    } else {
        spec.target_table
            .clone()
            .ok_or_else(|| SyncError::config("target_table must be specified because table_as_is = 0"))?
    };

    // Checked by validate().
    let id_column = spec.id_column.clone().unwrap_or_default();

    let mut columns = if spec.column_as_is {
        if spec.columns.is_some() {
            warn!("{}: column_as_is = 1, ignoring configured columns", label);
        }
        ColumnMapping::identity(live_source_columns.iter().map(|c| c.name.as_str()))
    } else {
        ColumnMapping::from_pairs(spec.columns.clone().unwrap_or_default())
    };

    match (&spec.target_id, spec.column_as_is) {
        (Some(target_id), false) => columns.rename_or_prepend(&id_column, target_id),
        (Some(target_id), true) => warn!(
            "{}: column_as_is = 1, ignoring target_id '{}'",
            label, target_id
        ),
        (None, _) => {}
    }

    let (id_column, target_id_column) = match columns.source_key(&id_column) {
        Some(key) => (
            key.to_string(),
            columns.target_of(key).unwrap_or(key).to_string(),
        ),
        None => {
            return Err(SyncError::config(format!(
                "{}: id_column '{}' is not one of the mapped columns",
                label, id_column
            )))
        }
    };

    let row_source = match &spec.query {
        Some(query) => {
            if spec.conditions.is_some() {
                warn!("{}: query is set, ignoring conditions", label);
            }
            RowSource::Query(trim_statement(query).to_string())
        }
        None => RowSource::Table {
            schema: source_schema.clone(),
            table: spec.source_table.clone(),
            conditions: spec
                .conditions
                .as_deref()
                .map(|c| trim_statement(c).to_string()),
        },
    };

    Ok(ResolvedTable {
        source_schema,
        source_table: spec.source_table.clone(),
        target_table,
        columns,
        id_column,
        target_id_column,
        row_source,
        source_columns: live_source_columns,
    })
}
