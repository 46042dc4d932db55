//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: source column metadata and row identifiers
//! - [`value`]: SQL value representation
//! - [`traits`]: source reader and target writer seams
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{find_column, IdValue, SourceColumn};
pub use traits::{Field, Row, RowSource, SourceReader, TargetColumn, TargetWriter};
pub use value::SqlValue;
