//! Logging setup: standard output plus a daily `YYYY-MM-DD.log` file.

use std::path::Path;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, SyncError};

/// Output format for both log destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(SyncError::config(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Map a verbosity name to a level; unknown names fall back to info.
pub fn parse_verbosity(verbosity: &str) -> LevelFilter {
    match verbosity.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`. The returned guard flushes
/// the file writer on drop and must live until the process exits.
pub fn init_logging(verbosity: &str, format: LogFormat, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let filter = EnvFilter::builder()
        .with_default_directive(parse_verbosity(verbosity).into())
        .from_env_lossy();

    let appender = rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| {
            SyncError::Logging(format!("cannot open log directory {}: {}", log_dir.display(), e))
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(|| fmt::layer().with_target(false)))
        .with(json.then(|| fmt::layer().json().with_target(false)))
        .with((!json).then(|| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file_writer.clone())
        }))
        .with(json.then(|| {
            fmt::layer()
                .json()
                .with_target(false)
                .with_writer(file_writer.clone())
        }))
        .try_init()
        .map_err(|e| SyncError::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("xml".parse::<LogFormat>().unwrap_err().kind(), "configuration");
    }

    #[test]
    fn test_verbosity_falls_back_to_info() {
        assert_eq!(parse_verbosity("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_verbosity("Warn"), LevelFilter::WARN);
        assert_eq!(parse_verbosity("loud"), LevelFilter::INFO);
    }
}
