//! In-memory source and target used by the engine tests.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::core::schema::{IdValue, SourceColumn};
use crate::core::traits::{Field, Row, RowSource, SourceReader, TargetColumn, TargetWriter};
use crate::core::value::SqlValue;
use crate::error::{Result, SyncError};

/// A row keyed by column name.
pub type NamedRow = IndexMap<String, SqlValue>;

/// Build a named row from pairs.
pub fn row(pairs: &[(&str, SqlValue)]) -> NamedRow {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn get_ignore_case<'a>(row: &'a NamedRow, name: &str) -> Option<&'a SqlValue> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn project(row: &NamedRow, fields: &[Field]) -> Result<Row> {
    fields
        .iter()
        .map(|f| {
            get_ignore_case(row, &f.name)
                .cloned()
                .ok_or_else(|| SyncError::decode(&f.name, "column not in row"))
        })
        .collect()
}

#[derive(Default)]
struct FakeSourceTable {
    columns: Vec<SourceColumn>,
    rows: Vec<NamedRow>,
}

type RowFilter = Box<dyn Fn(&NamedRow) -> bool + Send>;

/// Source reader over in-memory tables and canned query results.
#[derive(Default)]
pub struct FakeSource {
    tables: HashMap<String, FakeSourceTable>,
    filters: HashMap<String, RowFilter>,
    queries: HashMap<String, Vec<NamedRow>>,
    /// Every `RowSource` read, in order.
    pub reads: Vec<RowSource>,
    /// Every `schema.table` described, in order.
    pub described: Vec<String>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, schema: &str, table: &str, columns: Vec<SourceColumn>) -> Self {
        self.tables.insert(
            format!("{}.{}", schema, table),
            FakeSourceTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn with_rows(mut self, schema: &str, table: &str, rows: Vec<NamedRow>) -> Self {
        self.tables
            .entry(format!("{}.{}", schema, table))
            .or_default()
            .rows = rows;
        self
    }

    /// Register how a `conditions` string filters rows.
    pub fn with_filter<F>(mut self, conditions: &str, filter: F) -> Self
    where
        F: Fn(&NamedRow) -> bool + Send + 'static,
    {
        self.filters.insert(conditions.to_string(), Box::new(filter));
        self
    }

    pub fn with_query(mut self, query: &str, rows: Vec<NamedRow>) -> Self {
        self.queries.insert(query.to_string(), rows);
        self
    }

    pub fn rows_mut(&mut self, schema: &str, table: &str) -> &mut Vec<NamedRow> {
        &mut self
            .tables
            .entry(format!("{}.{}", schema, table))
            .or_default()
            .rows
    }

    fn source_rows(&mut self, source: &RowSource) -> Result<Vec<NamedRow>> {
        self.reads.push(source.clone());
        match source {
            RowSource::Table {
                schema,
                table,
                conditions,
            } => {
                let rows = self
                    .tables
                    .get(&format!("{}.{}", schema, table))
                    .map(|t| t.rows.clone())
                    .unwrap_or_default();
                Ok(match conditions.as_ref().and_then(|c| self.filters.get(c)) {
                    Some(filter) => rows.into_iter().filter(|r| filter(r)).collect(),
                    None => rows,
                })
            }
            RowSource::Query(query) => self
                .queries
                .get(query)
                .cloned()
                .ok_or_else(|| SyncError::config(format!("unknown query: {}", query))),
        }
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn describe_table(&mut self, schema: &str, table: &str) -> Result<Vec<SourceColumn>> {
        self.described.push(format!("{}.{}", schema, table));
        Ok(self
            .tables
            .get(&format!("{}.{}", schema, table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn fetch_ids(&mut self, source: &RowSource, id: &Field) -> Result<Vec<IdValue>> {
        let rows = self.source_rows(source)?;
        Ok(rows
            .iter()
            .filter_map(|r| get_ignore_case(r, &id.name).and_then(IdValue::from_sql_value))
            .collect())
    }

    async fn fetch_rows(&mut self, source: &RowSource, fields: &[Field]) -> Result<Vec<Row>> {
        let rows = self.source_rows(source)?;
        rows.iter().map(|r| project(r, fields)).collect()
    }

    async fn fetch_row_by_id(
        &mut self,
        schema: &str,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>> {
        let table = self.tables.get(&format!("{}.{}", schema, table));
        let found = table.and_then(|t| {
            t.rows.iter().find(|r| {
                get_ignore_case(r, id_column).and_then(IdValue::from_sql_value).as_ref() == Some(id)
            })
        });
        found.map(|r| project(r, fields)).transpose()
    }
}

/// A recorded target operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOp {
    CreateTable {
        table: String,
        columns: Vec<String>,
        primary_key: Option<String>,
    },
    AddColumn {
        table: String,
        column: String,
        definition: String,
    },
    SetAutoIncrement {
        table: String,
        seed: i64,
    },
    Delete {
        table: String,
        id: IdValue,
    },
    Insert {
        table: String,
        columns: Vec<String>,
    },
    Update {
        table: String,
        id: IdValue,
        columns: Vec<String>,
    },
    Commit,
}

impl TargetOp {
    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            TargetOp::Delete { .. } | TargetOp::Insert { .. } | TargetOp::Update { .. }
        )
    }
}

/// A target table held in memory.
#[derive(Debug, Default, Clone)]
pub struct FakeTargetTable {
    pub columns: Vec<TargetColumn>,
    pub primary_key: Option<String>,
    pub auto_increment: Option<i64>,
    pub rows: Vec<NamedRow>,
}

impl FakeTargetTable {
    fn find(&self, id_column: &str, id: &IdValue) -> Option<usize> {
        self.rows.iter().position(|r| {
            get_ignore_case(r, id_column).and_then(IdValue::from_sql_value).as_ref() == Some(id)
        })
    }

    /// Value of `column` in the row with the given id.
    pub fn value(&self, id_column: &str, id: &IdValue, column: &str) -> Option<SqlValue> {
        self.find(id_column, id)
            .and_then(|i| get_ignore_case(&self.rows[i], column).cloned())
    }
}

/// Target writer over in-memory tables, recording every operation.
#[derive(Default)]
pub struct FakeTarget {
    pub tables: HashMap<String, FakeTargetTable>,
    pub ops: Vec<TargetOp>,
    /// Fail statements touching this table.
    pub fail_on: Option<String>,
    /// Fail every call as if the connection dropped.
    pub disconnected: bool,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing table with untyped columns.
    pub fn with_table(mut self, table: &str, columns: &[&str], rows: Vec<NamedRow>) -> Self {
        let columns = columns
            .iter()
            .map(|name| TargetColumn {
                name: name.to_string(),
                definition: crate::typemap::TargetColumnDefinition {
                    sql_type: crate::typemap::MysqlType::Text,
                    is_nullable: true,
                    is_primary_key: false,
                    is_auto_increment: false,
                    auto_increment_seed: None,
                    auto_increment_step: None,
                },
            })
            .collect();
        self.tables.insert(
            table.to_string(),
            FakeTargetTable {
                columns,
                rows,
                ..Default::default()
            },
        );
        self
    }

    pub fn table(&self, table: &str) -> Option<&FakeTargetTable> {
        self.tables.get(table)
    }

    pub fn dml(&self) -> Vec<&TargetOp> {
        self.ops.iter().filter(|op| op.is_dml()).collect()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn check_connection(&self) -> Result<()> {
        if self.disconnected {
            return Err(SyncError::pool("connection reset", "fake target"));
        }
        Ok(())
    }

    fn check_failure(&self, table: &str, statement: &str) -> Result<()> {
        self.check_connection()?;
        match &self.fail_on {
            Some(failing) if failing == table => Err(SyncError::statement(
                table,
                statement,
                "simulated failure",
            )),
            _ => Ok(()),
        }
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut FakeTargetTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| SyncError::statement(table, "", "table doesn't exist"))
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.check_connection()?;
        Ok(self.tables.contains_key(table))
    }

    async fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_table(
        &mut self,
        table: &str,
        columns: &[TargetColumn],
        primary_key: Option<&str>,
    ) -> Result<()> {
        self.check_failure(table, "CREATE TABLE")?;
        self.tables.insert(
            table.to_string(),
            FakeTargetTable {
                columns: columns.to_vec(),
                primary_key: primary_key.map(str::to_string),
                ..Default::default()
            },
        );
        self.ops.push(TargetOp::CreateTable {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            primary_key: primary_key.map(str::to_string),
        });
        Ok(())
    }

    async fn add_column(&mut self, table: &str, column: &TargetColumn) -> Result<()> {
        self.check_failure(table, "ALTER TABLE")?;
        self.table_mut(table)?.columns.push(column.clone());
        self.ops.push(TargetOp::AddColumn {
            table: table.to_string(),
            column: column.name.clone(),
            definition: column.definition.render_additive(),
        });
        Ok(())
    }

    async fn set_auto_increment(&mut self, table: &str, seed: i64) -> Result<()> {
        self.table_mut(table)?.auto_increment = Some(seed);
        self.ops.push(TargetOp::SetAutoIncrement {
            table: table.to_string(),
            seed,
        });
        Ok(())
    }

    async fn fetch_ids(&mut self, table: &str, id: &Field) -> Result<Vec<IdValue>> {
        let table = self.table_mut(table)?;
        Ok(table
            .rows
            .iter()
            .filter_map(|r| get_ignore_case(r, &id.name).and_then(IdValue::from_sql_value))
            .collect())
    }

    async fn fetch_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>> {
        let table = self.table_mut(table)?;
        match table.find(id_column, id) {
            Some(i) => project(&table.rows[i], fields).map(Some),
            None => Ok(None),
        }
    }

    async fn delete_row(&mut self, table: &str, id_column: &str, id: &IdValue) -> Result<()> {
        self.check_failure(table, "DELETE")?;
        let t = self.table_mut(table)?;
        if let Some(i) = t.find(id_column, id) {
            t.rows.remove(i);
        }
        self.ops.push(TargetOp::Delete {
            table: table.to_string(),
            id: id.clone(),
        });
        Ok(())
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        self.check_failure(table, "INSERT")?;
        let row: NamedRow = columns.iter().cloned().zip(values.iter().cloned()).collect();
        self.table_mut(table)?.rows.push(row);
        self.ops.push(TargetOp::Insert {
            table: table.to_string(),
            columns: columns.to_vec(),
        });
        Ok(())
    }

    async fn update_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        assignments: &[(String, SqlValue)],
    ) -> Result<()> {
        self.check_failure(table, "UPDATE")?;
        let t = self.table_mut(table)?;
        if let Some(i) = t.find(id_column, id) {
            for (column, value) in assignments {
                t.rows[i].insert(column.clone(), value.clone());
            }
        }
        self.ops.push(TargetOp::Update {
            table: table.to_string(),
            id: id.clone(),
            columns: assignments.iter().map(|(c, _)| c.clone()).collect(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.check_connection()?;
        self.ops.push(TargetOp::Commit);
        Ok(())
    }
}
