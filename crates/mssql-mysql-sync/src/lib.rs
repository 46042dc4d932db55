//! # mssql-mysql-sync
//!
//! Periodic SQL Server to MySQL table replication.
//!
//! Every cycle, each configured source table is reconciled into its MySQL
//! counterpart:
//!
//! - **Schema**: a missing target table is created, missing mapped columns
//!   are added. Nothing is dropped or retyped.
//! - **Rows**: target rows whose id left the source are deleted, new ids are
//!   inserted, and comparable columns that differ are updated.
//!
//! Source rows are filtered by an optional predicate, or replaced entirely by
//! an operator query. Target writes of one cycle are committed together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_mysql_sync::{SourceConfig, SyncConfig, SyncOrchestrator, TargetConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(source: SourceConfig, target: TargetConfig) -> mssql_mysql_sync::Result<()> {
//! let config = SyncConfig::load("conf.json")?;
//! SyncOrchestrator::new(source, target, "conf.json", config)
//!     .run(CancellationToken::new(), true)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod reconcile;
pub mod schema;
pub mod typemap;

#[cfg(test)]
pub mod testing;

// Re-exports for convenient access
pub use config::{validate_connections, SourceConfig, SyncConfig, TableSyncSpec, TargetConfig};
pub use error::{Result, SyncError};
pub use logging::{init_logging, LogFormat};
pub use orchestrator::{CycleReport, SyncOrchestrator, TableOutcome, TableStatus};
pub use reconcile::ReconcileStats;
