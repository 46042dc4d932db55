//! Sync orchestrator - the periodic replication loop.
//!
//! Two states. `Connecting` builds both pools, retrying with a fixed delay.
//! `Running` executes one cycle per interval: check out one connection per
//! side, sync every configured table in order, commit, sleep.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{resolve, SourceConfig, SyncConfig, TableSyncSpec, TargetConfig};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::{MssqlSource, MysqlTarget};
use crate::error::{Result, SyncError};
use crate::reconcile::{reconcile, ReconcileStats};
use crate::schema;

/// Delay between connection attempts while `Connecting`.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Outcome of one table within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Synced {
        stats: ReconcileStats,
        created: bool,
        added_columns: Vec<String>,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
    /// Not attempted: the cycle was cancelled or lost its connections.
    Skipped,
}

/// One table's line in the cycle report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    /// `schema.table` of the source.
    pub table: String,
    pub status: TableStatus,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub tables: Vec<TableOutcome>,
    pub duration: Duration,
    /// Why the cycle stopped early or did not commit, if it did.
    pub error: Option<String>,
}

impl CycleReport {
    fn aborted(cycle: u64, started: Instant, error: &SyncError) -> Self {
        Self {
            cycle,
            tables: Vec::new(),
            duration: started.elapsed(),
            error: Some(error.to_string()),
        }
    }

    /// Sum of the row counts of every synced table.
    pub fn totals(&self) -> ReconcileStats {
        self.tables
            .iter()
            .fold(ReconcileStats::default(), |mut acc, t| {
                if let TableStatus::Synced { stats, .. } = &t.status {
                    acc.inserted += stats.inserted;
                    acc.updated += stats.updated;
                    acc.deleted += stats.deleted;
                }
                acc
            })
    }

    pub fn synced_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, TableStatus::Synced { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, TableStatus::Failed { .. }))
            .count()
    }

    /// Log the one-line summary plus one line per failed table.
    pub fn log(&self) {
        let totals = self.totals();
        info!(
            "cycle {} finished in {:.1}s: {} synced, {} failed, {} skipped; {} inserted, {} updated, {} deleted",
            self.cycle,
            self.duration.as_secs_f64(),
            self.synced_count(),
            self.failed_count(),
            self.tables.len() - self.synced_count() - self.failed_count(),
            totals.inserted,
            totals.updated,
            totals.deleted
        );
        for table in &self.tables {
            if let TableStatus::Failed { kind, message } = &table.status {
                warn!("cycle {}: {} failed ({}): {}", self.cycle, table.table, kind, message);
            }
        }
        if let Some(error) = &self.error {
            error!("cycle {}: {}", self.cycle, error);
        }
    }
}

/// Sync one table: resolve, reconcile schema, reconcile rows.
///
/// Flags are validated before the first database call.
pub async fn sync_table<S, T>(
    source: &mut S,
    target: &mut T,
    spec: &TableSyncSpec,
    config: &SyncConfig,
    default_schema: &str,
) -> Result<TableStatus>
where
    S: SourceReader + ?Sized,
    T: TargetWriter + ?Sized,
{
    spec.validate()?;

    let schema_name = spec.source_schema_or(default_schema);
    let live = source.describe_table(schema_name, &spec.source_table).await?;
    if live.is_empty() {
        return Err(SyncError::config(format!(
            "source table {}.{} not found",
            schema_name, spec.source_table
        )));
    }
    let resolved = resolve(spec, default_schema, live)?;

    let outcome = schema::ensure(target, &resolved, |c| config.is_audit_column(c)).await?;
    let stats = reconcile(source, target, &resolved, &outcome.plan).await?;

    Ok(TableStatus::Synced {
        stats,
        created: outcome.created,
        added_columns: outcome.added_columns,
    })
}

/// Run one cycle over already checked-out connections.
///
/// A failing table is recorded and the next one runs. A lost connection
/// skips the remaining tables and the commit.
pub async fn run_cycle<S, T>(
    source: &mut S,
    target: &mut T,
    config: &SyncConfig,
    default_schema: &str,
    cycle: u64,
    cancel: &CancellationToken,
) -> CycleReport
where
    S: SourceReader + ?Sized,
    T: TargetWriter + ?Sized,
{
    let started = Instant::now();
    let mut tables = Vec::with_capacity(config.tables.len());
    let mut error = None;

    for spec in &config.tables {
        let label = format!(
            "{}.{}",
            spec.source_schema_or(default_schema),
            spec.source_table
        );

        if error.is_some() || cancel.is_cancelled() {
            tables.push(TableOutcome {
                table: label,
                status: TableStatus::Skipped,
            });
            continue;
        }

        let span = info_span!(
            "table",
            source = %label,
            target = spec.target_table.as_deref().unwrap_or(spec.source_table.as_str())
        );
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = sync_table(source, target, spec, config, default_schema).instrument(span) => Some(result),
        };

        let Some(result) = result else {
            info!("{}: interrupted", label);
            tables.push(TableOutcome {
                table: label,
                status: TableStatus::Skipped,
            });
            continue;
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                error!("{}: {}", label, e);
                if e.is_connection_lost() {
                    error = Some(format!("connection lost while syncing {}: {}", label, e));
                }
                TableStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        tables.push(TableOutcome {
            table: label,
            status,
        });
    }

    if error.is_none() && !cancel.is_cancelled() {
        if let Err(e) = target.commit().await {
            error = Some(format!("commit failed: {}", e));
        }
    }

    CycleReport {
        cycle,
        tables,
        duration: started.elapsed(),
        error,
    }
}

enum ConnectState {
    Connecting,
    Running {
        source: MssqlSource,
        target: MysqlTarget,
    },
}

/// The replication loop.
pub struct SyncOrchestrator {
    source_config: SourceConfig,
    target_config: TargetConfig,
    config_path: PathBuf,
    config: SyncConfig,
    frequency_override: Option<u64>,
    retry_delay: Duration,
}

impl SyncOrchestrator {
    /// `config` is the validated file loaded at startup from `config_path`.
    pub fn new(
        source_config: SourceConfig,
        target_config: TargetConfig,
        config_path: impl Into<PathBuf>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source_config,
            target_config,
            config_path: config_path.into(),
            config,
            frequency_override: None,
            retry_delay: CONNECT_RETRY_DELAY,
        }
    }

    /// Interval override in seconds, taking precedence over the file.
    pub fn with_frequency(mut self, secs: Option<u64>) -> Self {
        self.frequency_override = secs;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run until cancelled, or for one cycle when `once` is set.
    ///
    /// In `once` mode a failed connection attempt is returned instead of
    /// retried.
    pub async fn run(mut self, cancel: CancellationToken, once: bool) -> Result<()> {
        let mut state = ConnectState::Connecting;
        let mut cycle: u64 = 0;

        loop {
            state = match state {
                ConnectState::Connecting => match self.connect().await {
                    Ok((source, target)) => ConnectState::Running { source, target },
                    Err(e) if once => return Err(e),
                    Err(e) => {
                        error!(
                            "Cannot connect ({}), retrying in {}s",
                            e,
                            self.retry_delay.as_secs()
                        );
                        if !pause(self.retry_delay, &cancel).await {
                            info!("Shutdown requested");
                            return Ok(());
                        }
                        ConnectState::Connecting
                    }
                },
                ConnectState::Running { source, target } => {
                    cycle += 1;
                    if cycle > 1 {
                        self.reload_config();
                    }

                    let report = self.cycle(&source, &target, cycle, &cancel).await;
                    report.log();

                    let interval = self.config.interval(self.frequency_override);
                    if once || cancel.is_cancelled() || !pause(interval, &cancel).await {
                        if !once {
                            info!("Shutdown requested");
                        }
                        target.close().await;
                        return Ok(());
                    }
                    ConnectState::Running { source, target }
                }
            };
        }
    }

    async fn connect(&self) -> Result<(MssqlSource, MysqlTarget)> {
        let source = MssqlSource::connect(&self.source_config).await?;
        let target = MysqlTarget::connect(&self.target_config).await?;
        Ok((source, target))
    }

    /// Re-read the configuration file; keep the previous one on failure.
    fn reload_config(&mut self) {
        match SyncConfig::load(&self.config_path) {
            Ok(config) => self.config = config,
            Err(e) => warn!(
                "Cannot reload {}, keeping previous configuration: {}",
                self.config_path.display(),
                e
            ),
        }
    }

    async fn cycle(
        &self,
        source: &MssqlSource,
        target: &MysqlTarget,
        cycle: u64,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let started = Instant::now();
        info!("cycle {}: syncing {} tables", cycle, self.config.tables.len());

        let mut source_session = match source.session().await {
            Ok(session) => session,
            Err(e) => return CycleReport::aborted(cycle, started, &e),
        };
        let mut target_session = match target.session().await {
            Ok(session) => session,
            Err(e) => return CycleReport::aborted(cycle, started, &e),
        };

        run_cycle(
            &mut source_session,
            &mut target_session,
            &self.config,
            &self.source_config.schema,
            cycle,
            cancel,
        )
        .await
    }
}

/// Sleep for `duration`; false when cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
