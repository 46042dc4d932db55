//! Configuration loading and validation.

mod resolve;
mod types;
mod validation;

pub use resolve::{resolve, ColumnMapping, ResolvedTable};
pub use types::*;

use std::path::Path;
use std::time::Duration;

use crate::error::Result;

impl SyncConfig {
    /// Load the sync configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse the sync configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and every table entry.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Effective cycle interval: `override_secs`, else the file, else 60 s.
    pub fn interval(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(
            override_secs
                .or(self.frequency)
                .unwrap_or(DEFAULT_FREQUENCY_SECS),
        )
    }

    /// Whether `column` is compared at whole-second granularity.
    pub fn is_audit_column(&self, column: &str) -> bool {
        self.audit_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

impl TableSyncSpec {
    /// Validate flags and names without touching a database.
    pub fn validate(&self) -> Result<()> {
        validation::validate_table(self)
    }
}

/// Validate connection settings.
pub fn validate_connections(source: &SourceConfig, target: &TargetConfig) -> Result<()> {
    validation::validate_connections(source, target)
}
