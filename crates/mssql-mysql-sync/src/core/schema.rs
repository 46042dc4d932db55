//! Column metadata and row identifier types.
//!
//! Column descriptors are read from the source catalog on every cycle and are
//! never persisted.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value::SqlValue;

/// Value of the single identifier column of a synced table.
///
/// Both sides decode their id column into this type, so deletion sets are
/// computed with plain set difference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdValue {
    /// Integer id (covers int, bigint, smallint, tinyint, integral decimals).
    Int(i64),
    /// UUID/GUID id.
    Uuid(Uuid),
    /// String id (varchar, nvarchar, char, nchar).
    String(String),
}

impl IdValue {
    /// Convert a decoded column value into an id.
    ///
    /// Returns `None` for NULL and for values that cannot act as identifiers
    /// (floats, binary, temporal values, fractional decimals).
    pub fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::I16(v) => Some(IdValue::Int(i64::from(*v))),
            SqlValue::I32(v) => Some(IdValue::Int(i64::from(*v))),
            SqlValue::I64(v) => Some(IdValue::Int(*v)),
            SqlValue::Bool(v) => Some(IdValue::Int(i64::from(*v))),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64().map(IdValue::Int),
            SqlValue::Uuid(v) => Some(IdValue::Uuid(*v)),
            SqlValue::Text(v) => Some(IdValue::String(v.clone())),
            _ => None,
        }
    }

    /// Convert back into a bindable value.
    pub fn to_sql_value(&self) -> SqlValue {
        match self {
            IdValue::Int(v) => SqlValue::I64(*v),
            IdValue::Uuid(v) => SqlValue::Uuid(*v),
            IdValue::String(v) => SqlValue::Text(v.clone()),
        }
    }

    /// Render as a MySQL literal for statement logs.
    pub fn to_mysql_literal(&self) -> String {
        self.to_sql_value().to_mysql_literal()
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Int(v) => write!(f, "{}", v),
            IdValue::Uuid(v) => write!(f, "{}", v),
            IdValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for IdValue {
    fn from(v: i64) -> Self {
        IdValue::Int(v)
    }
}

impl From<i32> for IdValue {
    fn from(v: i32) -> Self {
        IdValue::Int(v as i64)
    }
}

impl From<Uuid> for IdValue {
    fn from(v: Uuid) -> Self {
        IdValue::Uuid(v)
    }
}

impl From<String> for IdValue {
    fn from(v: String) -> Self {
        IdValue::String(v)
    }
}

impl From<&str> for IdValue {
    fn from(v: &str) -> Self {
        IdValue::String(v.to_string())
    }
}

/// Column metadata read from the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Column name.
    pub name: String,

    /// Native type name (e.g., "int", "nvarchar", "datetime2").
    pub data_type: String,

    /// Character length for string types; -1 means unbounded (MAX).
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub precision: Option<i32>,

    /// Numeric scale.
    pub scale: Option<i32>,

    /// Fractional-second precision of temporal types.
    pub datetime_precision: Option<i32>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is an identity column.
    pub is_identity: bool,

    /// Identity seed of the table, when the column is an identity column.
    pub identity_seed: Option<i64>,

    /// Identity increment of the table, when the column is an identity column.
    pub identity_increment: Option<i64>,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl SourceColumn {
    /// A nullable, non-identity column with no length or precision.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            precision: None,
            scale: None,
            datetime_precision: None,
            is_nullable: true,
            is_identity: false,
            identity_seed: None,
            identity_increment: None,
            ordinal_pos: 0,
        }
    }

    /// Set the character length.
    pub fn with_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set numeric precision and scale.
    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Mark as an identity column.
    pub fn with_identity(mut self, seed: i64, increment: i64) -> Self {
        self.is_identity = true;
        self.identity_seed = Some(seed);
        self.identity_increment = Some(increment);
        self.is_nullable = false;
        self
    }
}

/// Find a column by name, ignoring ASCII case.
pub fn find_column<'a>(columns: &'a [SourceColumn], name: &str) -> Option<&'a SourceColumn> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}
