//! Database drivers.
//!
//! - [`mssql`]: SQL Server source, implements [`SourceReader`](crate::core::SourceReader)
//! - [`mysql`]: MySQL target, implements [`TargetWriter`](crate::core::TargetWriter)
//!
//! The engine only sees the traits; each driver owns its pool, statement
//! text and value decoding.

pub mod mssql;
pub mod mysql;

pub use mssql::{MssqlSession, MssqlSource};
pub use mysql::{MysqlSession, MysqlTarget};
