//! Core traits for the reconciliation engine.
//!
//! - [`SourceReader`]: reads catalog metadata, ids and rows from the source
//! - [`TargetWriter`]: inspects and mutates the target table
//!
//! Both are implemented over one checked-out connection each, so every
//! method takes `&mut self`. The engine never sees driver types.

use async_trait::async_trait;

use crate::error::Result;
use crate::typemap::{SourceType, TargetColumnDefinition};

use super::schema::{IdValue, SourceColumn};
use super::value::SqlValue;

/// One decoded row, ordered like the requested fields.
pub type Row = Vec<SqlValue>;

/// A column to read, with the source type that drives decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name on the side being read.
    pub name: String,
    /// Source type of the column.
    pub source_type: SourceType,
}

impl Field {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
        }
    }
}

/// Where source rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSource {
    /// A source table, optionally filtered by a raw predicate.
    Table {
        schema: String,
        table: String,
        conditions: Option<String>,
    },
    /// An operator-supplied query; fields are located by column name.
    Query(String),
}

/// A target column to create or add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub definition: TargetColumnDefinition,
}

/// Read schema and data from the source database.
#[async_trait]
pub trait SourceReader: Send {
    /// Live column metadata in ordinal order. Empty when the table is absent.
    async fn describe_table(&mut self, schema: &str, table: &str) -> Result<Vec<SourceColumn>>;

    /// Id values of every row produced by `source`.
    async fn fetch_ids(&mut self, source: &RowSource, id: &Field) -> Result<Vec<IdValue>>;

    /// Rows produced by `source`, projected onto `fields` in order.
    async fn fetch_rows(&mut self, source: &RowSource, fields: &[Field]) -> Result<Vec<Row>>;

    /// A single table row by id, projected onto `fields`.
    async fn fetch_row_by_id(
        &mut self,
        schema: &str,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>>;
}

/// Inspect and write the target database.
///
/// Implementations log every statement they execute.
#[async_trait]
pub trait TargetWriter: Send {
    /// Check if a table exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Live column names of a table.
    async fn column_names(&mut self, table: &str) -> Result<Vec<String>>;

    /// Create a table with an optional single-column primary key.
    async fn create_table(
        &mut self,
        table: &str,
        columns: &[TargetColumn],
        primary_key: Option<&str>,
    ) -> Result<()>;

    /// Add a column to an existing table.
    async fn add_column(&mut self, table: &str, column: &TargetColumn) -> Result<()>;

    /// Set the next AUTO_INCREMENT value.
    async fn set_auto_increment(&mut self, table: &str, seed: i64) -> Result<()>;

    /// Id values present in the table.
    async fn fetch_ids(&mut self, table: &str, id: &Field) -> Result<Vec<IdValue>>;

    /// The row with the given id, projected onto `fields`.
    async fn fetch_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Option<Row>>;

    /// Delete the row with the given id.
    async fn delete_row(&mut self, table: &str, id_column: &str, id: &IdValue) -> Result<()>;

    /// Insert one row.
    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[SqlValue])
        -> Result<()>;

    /// Update the given columns of one row.
    async fn update_row(
        &mut self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        assignments: &[(String, SqlValue)],
    ) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;
}
