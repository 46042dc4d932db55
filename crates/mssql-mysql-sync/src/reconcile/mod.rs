//! Row reconciliation: delete, insert and update until the target matches.
//!
//! One pass per table:
//!
//! 1. Delete target ids missing from the source (plain set difference).
//! 2. Walk the source rows in their natural order. Rows absent from the
//!    target are inserted with every mapped column; present rows get one
//!    UPDATE covering the comparable columns that differ.

pub mod compare;

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::ResolvedTable;
use crate::core::schema::IdValue;
use crate::core::traits::{Field, Row, SourceReader, TargetWriter};
use crate::core::value::SqlValue;
use crate::error::Result;
use crate::plan::{ColumnPlan, TablePlan};

pub use compare::{values_match, Granularity};

/// Row counts written for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl ReconcileStats {
    /// Total rows written.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

/// Reconcile the rows of one table.
pub async fn reconcile<S, T>(
    source: &mut S,
    target: &mut T,
    resolved: &ResolvedTable,
    plan: &TablePlan,
) -> Result<ReconcileStats>
where
    S: SourceReader + ?Sized,
    T: TargetWriter + ?Sized,
{
    let mut stats = ReconcileStats::default();
    let table = resolved.target_table.as_str();
    let id_column = resolved.target_id_column.as_str();
    let id = plan.id();

    // Step 1: deletions.
    let source_ids: BTreeSet<IdValue> = source
        .fetch_ids(&resolved.row_source, &id.source_field())
        .await?
        .into_iter()
        .collect();
    let target_ids: BTreeSet<IdValue> = target
        .fetch_ids(table, &id.target_field())
        .await?
        .into_iter()
        .collect();

    for stale in target_ids.difference(&source_ids) {
        target.delete_row(table, id_column, stale).await?;
        stats.deleted += 1;
    }

    // Step 2: inserts and updates.
    let read_columns = read_columns(resolved, plan);
    let read_fields: Vec<Field> = read_columns.iter().map(|c| c.source_field()).collect();
    let compared: Vec<(usize, &ColumnPlan)> = read_columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_comparable())
        .map(|(i, c)| (i, *c))
        .collect();
    let compared_fields: Vec<Field> = compared.iter().map(|(_, c)| c.target_field()).collect();

    let rows = source
        .fetch_rows(&resolved.row_source, &read_fields)
        .await?;
    debug!("{}: {} source rows", table, rows.len());

    for row in rows {
        let Some(row_id) = row.first().and_then(IdValue::from_sql_value) else {
            warn!("{}: skipping source row with NULL or unusable id", table);
            continue;
        };

        match target
            .fetch_row(table, id_column, &row_id, &compared_fields)
            .await?
        {
            None => {
                let (columns, values) =
                    insert_values(source, resolved, plan, &read_columns, &row, &row_id).await?;
                target.insert_row(table, &columns, &values).await?;
                stats.inserted += 1;
            }
            Some(existing) => {
                let assignments: Vec<(String, SqlValue)> = compared
                    .iter()
                    .zip(existing.iter())
                    .filter(|((_, column), _)| !std::ptr::eq(*column, id))
                    .filter(|((i, column), current)| !values_match(&row[*i], current, column))
                    .map(|((i, column), _)| (column.target.clone(), row[*i].clone()))
                    .collect();

                if !assignments.is_empty() {
                    target
                        .update_row(table, id_column, &row_id, &assignments)
                        .await?;
                    stats.updated += 1;
                }
            }
        }
    }

    info!(
        "{}: {} inserted, {} updated, {} deleted",
        table, stats.inserted, stats.updated, stats.deleted
    );
    Ok(stats)
}

/// Columns read in the main row pass, id first.
///
/// Table mode reads only comparable columns; the rest are fetched per
/// inserted row. Query mode reads every mapped column from the result set.
fn read_columns<'a>(resolved: &ResolvedTable, plan: &'a TablePlan) -> Vec<&'a ColumnPlan> {
    if resolved.is_query_mode() {
        let id = plan.id();
        std::iter::once(id)
            .chain(plan.columns().iter().filter(|c| !std::ptr::eq(*c, id)))
            .collect()
    } else {
        plan.comparable_id_first()
    }
}

/// Every mapped column with its value, in mapping order.
async fn insert_values<S>(
    source: &mut S,
    resolved: &ResolvedTable,
    plan: &TablePlan,
    read_columns: &[&ColumnPlan],
    row: &Row,
    id: &IdValue,
) -> Result<(Vec<String>, Vec<SqlValue>)>
where
    S: SourceReader + ?Sized,
{
    let missing: Vec<&ColumnPlan> = plan
        .columns()
        .iter()
        .filter(|c| !read_columns.iter().any(|r| std::ptr::eq(*r, *c)))
        .collect();

    let fetched: Row = if missing.is_empty() {
        Vec::new()
    } else {
        let fields: Vec<Field> = missing.iter().map(|c| c.source_field()).collect();
        match source
            .fetch_row_by_id(
                &resolved.source_schema,
                &resolved.source_table,
                &plan.id().source,
                id,
                &fields,
            )
            .await?
        {
            Some(values) => values,
            None => {
                warn!(
                    "{}: row {} vanished from the source, inserting NULL for {} columns",
                    resolved.source_name(),
                    id,
                    missing.len()
                );
                vec![SqlValue::Null; missing.len()]
            }
        }
    };

    let mut columns = Vec::with_capacity(plan.columns().len());
    let mut values = Vec::with_capacity(plan.columns().len());
    for column in plan.columns() {
        let value = read_columns
            .iter()
            .position(|r| std::ptr::eq(*r, column))
            .and_then(|i| row.get(i))
            .or_else(|| {
                missing
                    .iter()
                    .position(|m| std::ptr::eq(*m, column))
                    .and_then(|i| fetched.get(i))
            })
            .cloned()
            .unwrap_or(SqlValue::Null);
        columns.push(column.target.clone());
        values.push(value);
    }
    Ok((columns, values))
}
