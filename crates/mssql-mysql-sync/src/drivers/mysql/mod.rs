//! MySQL target driver.
//!
//! - [`MysqlDialect`]: statement builders with bound parameters
//! - [`MysqlTarget`]: connection pool for the target database
//! - [`MysqlSession`]: [`TargetWriter`](crate::core::TargetWriter) over one
//!   checked-out connection
//!
//! Supports MySQL 5.7+ and 8.0+.

mod dialect;
mod writer;

pub use dialect::{MysqlDialect, Statement};
pub use writer::{MysqlSession, MysqlTarget};
