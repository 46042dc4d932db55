//! Per-table column plan shared by the schema and row reconcilers.
//!
//! Built once per table per cycle from the resolved mapping and the live
//! source catalog. Nothing here is cached across cycles.

use crate::config::ResolvedTable;
use crate::core::schema::find_column;
use crate::core::traits::{Field, TargetColumn};
use crate::error::{Result, SyncError};
use crate::typemap::{map_table, SourceType, TargetColumnDefinition};

/// One mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Source column name as spelled in the live catalog.
    pub source: String,
    /// Target column name.
    pub target: String,
    pub source_type: SourceType,
    pub definition: TargetColumnDefinition,
    /// Compared at whole-second granularity.
    pub audit: bool,
}

impl ColumnPlan {
    pub fn is_comparable(&self) -> bool {
        self.definition.is_comparable()
    }

    pub fn source_field(&self) -> Field {
        Field::new(self.source.clone(), self.source_type)
    }

    pub fn target_field(&self) -> Field {
        Field::new(self.target.clone(), self.source_type)
    }

    pub fn target_column(&self) -> TargetColumn {
        TargetColumn {
            name: self.target.clone(),
            definition: self.definition.clone(),
        }
    }
}

/// Column plan of one table, in mapping order.
#[derive(Debug, Clone)]
pub struct TablePlan {
    columns: Vec<ColumnPlan>,
    id_index: usize,
}

impl TablePlan {
    /// Build the plan for a resolved table.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` when a mapped source column is missing from the
    ///   live catalog
    /// - `UnsupportedType` when a mapped column has no target type
    /// - `Config` when the id column's type cannot identify rows
    pub fn build<F>(resolved: &ResolvedTable, is_audit_column: F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        let table = resolved.source_name();

        if resolved.source_columns.is_empty() {
            return Err(SyncError::config(format!(
                "source table {} not found or has no columns",
                table
            )));
        }

        let mut matched = Vec::with_capacity(resolved.columns.len());
        for (source, target) in resolved.columns.iter() {
            let live = find_column(&resolved.source_columns, source).ok_or_else(|| {
                SyncError::SchemaMismatch {
                    table: table.clone(),
                    column: source.to_string(),
                }
            })?;
            matched.push((live, target));
        }

        let definitions = map_table(&table, matched.iter().map(|(live, _)| *live))?;

        let mut columns = Vec::with_capacity(matched.len());
        let mut id_index = None;
        for ((live, target), definition) in matched.into_iter().zip(definitions) {
            // map_table already rejected unknown type names.
            let source_type = SourceType::parse(&live.data_type).ok_or_else(|| {
                SyncError::UnsupportedType {
                    table: table.clone(),
                    column: live.name.clone(),
                    type_name: live.data_type.clone(),
                }
            })?;

            if live.name.eq_ignore_ascii_case(&resolved.id_column) {
                id_index = Some(columns.len());
            }

            columns.push(ColumnPlan {
                source: live.name.clone(),
                target: target.to_string(),
                source_type,
                definition,
                audit: is_audit_column(&live.name),
            });
        }

        let id_index = id_index.ok_or_else(|| {
            SyncError::config(format!(
                "{}: id_column '{}' is not one of the mapped columns",
                table, resolved.id_column
            ))
        })?;

        let id_type = columns[id_index].source_type;
        if !id_type.is_valid_id() {
            return Err(SyncError::config(format!(
                "{}: id_column '{}' has type {} which cannot identify rows",
                table, resolved.id_column, id_type
            )));
        }

        Ok(Self { columns, id_index })
    }

    /// All mapped columns in mapping order.
    pub fn columns(&self) -> &[ColumnPlan] {
        &self.columns
    }

    /// The id column.
    pub fn id(&self) -> &ColumnPlan {
        &self.columns[self.id_index]
    }

    /// Comparable columns with the id column first.
    pub fn comparable_id_first(&self) -> Vec<&ColumnPlan> {
        std::iter::once(self.id())
            .chain(
                self.columns
                    .iter()
                    .enumerate()
                    .filter(|(i, c)| *i != self.id_index && c.is_comparable())
                    .map(|(_, c)| c),
            )
            .collect()
    }

    /// Columns that never take part in update detection.
    pub fn non_comparable(&self) -> Vec<&ColumnPlan> {
        self.columns.iter().filter(|c| !c.is_comparable()).collect()
    }
}
