//! Microsoft SQL Server source driver.
//!
//! - [`MssqlSource`]: bb8 pool of Tiberius connections
//! - [`MssqlSession`]: [`SourceReader`](crate::core::SourceReader) over one
//!   checked-out connection

mod dialect;
mod reader;

pub use reader::{MssqlSession, MssqlSource, TiberiusConnectionManager};
