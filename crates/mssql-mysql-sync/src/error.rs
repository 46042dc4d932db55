//! Error types for the sync library.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (missing fields, invalid identifiers, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target could not be reached.
    #[error("Connectivity error ({side}): {message}")]
    Connectivity { side: &'static str, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A source column type has no target mapping.
    #[error("Unsupported source type '{type_name}' for column {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        type_name: String,
    },

    /// A configured source column is missing from the live source catalog.
    #[error("Source table {table} has no column {column}")]
    SchemaMismatch { table: String, column: String },

    /// A DDL/DML statement failed at the database.
    #[error("Statement failed on {table}: {message}\n  Statement: {statement}")]
    Statement {
        table: String,
        statement: String,
        message: String,
    },

    /// A value read from either side could not be decoded.
    #[error("Cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging could not be initialized.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl SyncError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Statement error carrying the rendered statement text.
    pub fn statement(
        table: impl Into<String>,
        statement: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        SyncError::Statement {
            table: table.into(),
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a Decode error.
    pub fn decode(column: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Decode {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "configuration",
            SyncError::Connectivity { .. } | SyncError::Pool { .. } => "connectivity",
            SyncError::UnsupportedType { .. } => "unsupported_type",
            SyncError::SchemaMismatch { .. } => "schema_mismatch",
            SyncError::Statement { .. } => "statement_execution",
            SyncError::Source(_) | SyncError::Target(_) | SyncError::Decode { .. } => "database",
            SyncError::Io(_) | SyncError::Json(_) | SyncError::Logging(_) => "io",
        }
    }

    /// Whether the error loses the connections for the rest of the cycle.
    ///
    /// Everything else only abandons the current table.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            SyncError::Connectivity { .. } | SyncError::Pool { .. } => true,
            SyncError::Source(tiberius::error::Error::Io { .. }) => true,
            SyncError::Target(mysql_async::Error::Io(_)) => true,
            _ => false,
        }
    }

    /// Whether the error only abandons the current table.
    pub fn is_table_fatal(&self) -> bool {
        !self.is_connection_lost()
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Json(_) => 2,
            SyncError::Io(_) | SyncError::Logging(_) => 3,
            _ => 1,
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
