//! mssql-mysql-sync CLI - keep MySQL tables convergent with SQL Server.

use clap::{ArgAction, Parser};
use mssql_mysql_sync::{
    init_logging, validate_connections, LogFormat, SourceConfig, SyncConfig, SyncError,
    SyncOrchestrator, TargetConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-mysql-sync")]
#[command(about = "Periodic SQL Server to MySQL table replication")]
#[command(version)]
struct Cli {
    /// Path to the JSON sync configuration
    #[arg(short, long, env = "SYNC_CONFIG", default_value = "conf.json")]
    config: PathBuf,

    /// Seconds between cycles (overrides the configuration file)
    #[arg(long, env = "SYNC_FREQUENCY")]
    frequency: Option<u64>,

    /// Directory for the daily log files
    #[arg(long, env = "SYNC_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration file and exit without connecting
    #[arg(long)]
    check_config: bool,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// SQL Server host
    #[arg(long, env = "MSSQL_HOST", default_value = "")]
    mssql_host: String,

    /// SQL Server port
    #[arg(long, env = "MSSQL_PORT", default_value_t = 1433)]
    mssql_port: u16,

    /// SQL Server user
    #[arg(long, env = "MSSQL_USER", default_value = "")]
    mssql_user: String,

    /// SQL Server password
    #[arg(long, env = "MSSQL_PASSWORD", default_value = "", hide_env_values = true)]
    mssql_password: String,

    /// SQL Server database
    #[arg(long, env = "MSSQL_DB", default_value = "")]
    mssql_db: String,

    /// Schema for table entries that name none
    #[arg(long, env = "MSSQL_SCHEMA", default_value = "dbo")]
    mssql_schema: String,

    /// Encrypt the SQL Server connection
    #[arg(long, env = "MSSQL_ENCRYPT", default_value_t = true, action = ArgAction::Set)]
    mssql_encrypt: bool,

    /// Trust the SQL Server certificate without validation
    #[arg(long, env = "MSSQL_TRUST_CERT")]
    mssql_trust_cert: bool,
}

impl SourceArgs {
    fn into_config(self) -> SourceConfig {
        SourceConfig {
            host: self.mssql_host,
            port: self.mssql_port,
            database: self.mssql_db,
            user: self.mssql_user,
            password: self.mssql_password,
            schema: self.mssql_schema,
            encrypt: self.mssql_encrypt,
            trust_server_cert: self.mssql_trust_cert,
        }
    }
}

#[derive(clap::Args)]
struct TargetArgs {
    /// MySQL host
    #[arg(long, env = "MYSQL_HOST", default_value = "")]
    mysql_host: String,

    /// MySQL port
    #[arg(long, env = "MYSQL_PORT", default_value_t = 3306)]
    mysql_port: u16,

    /// MySQL user
    #[arg(long, env = "MYSQL_USER", default_value = "")]
    mysql_user: String,

    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD", default_value = "", hide_env_values = true)]
    mysql_password: String,

    /// MySQL database holding the target tables
    #[arg(long, env = "MYSQL_DB", default_value = "")]
    mysql_db: String,

    /// MySQL SSL mode: disable, prefer, require, verify_ca, verify_identity
    #[arg(long, env = "MYSQL_SSL_MODE", default_value = "prefer")]
    mysql_ssl_mode: String,
}

impl TargetArgs {
    fn into_config(self) -> TargetConfig {
        TargetConfig {
            host: self.mysql_host,
            port: self.mysql_port,
            database: self.mysql_db,
            user: self.mysql_user,
            password: self.mysql_password,
            ssl_mode: self.mysql_ssl_mode,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();
    let format: LogFormat = cli.log_format.parse()?;

    if cli.check_config {
        let config = SyncConfig::load(&cli.config)?;
        println!(
            "{}: {} table(s), every {}s",
            cli.config.display(),
            config.tables.len(),
            config.interval(cli.frequency).as_secs()
        );
        for table in &config.tables {
            let target = match (&table.target_table, table.table_as_is) {
                (Some(target), false) => target.as_str(),
                _ => table.source_table.as_str(),
            };
            println!("  {} -> {}", table.label(), target);
        }
        return Ok(());
    }

    // Held until exit so buffered log lines reach the file.
    let _log_guard = init_logging(&cli.verbosity, format, &cli.log_dir)?;

    let config = SyncConfig::load(&cli.config)?;
    info!(
        "Loaded {} table(s) from {}",
        config.tables.len(),
        cli.config.display()
    );

    let source = cli.source.into_config();
    let target = cli.target.into_config();
    validate_connections(&source, &target)?;
    info!(
        "Source {}:{}/{}, target {}:{}/{}",
        source.host, source.port, source.database, target.host, target.port, target.database
    );

    let cancel_token = setup_signal_handler();

    SyncOrchestrator::new(source, target, cli.config, config)
        .with_frequency(cli.frequency)
        .run(cancel_token, cli.once)
        .await
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    info!("Received {}, stopping after the current statement", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, stopping after the current statement");
                token.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    cancel_token
}
