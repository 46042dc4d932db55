//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table and column names come from the sync configuration and from live
//! catalogs. They cannot be bound as statement parameters, so every name is
//! checked against an allow-list of characters before it is quoted and
//! interpolated. Data values never go through this module; they are always
//! bound as parameters.
//!
//! Raw SQL fragments supplied by the operator (`conditions`, `query`) are
//! screened with [`validate_sql_fragment`] for statement separators, comments
//! and dangerous procedure calls.

use crate::error::{Result, SyncError};

/// Maximum identifier length (conservative limit across databases).
/// - SQL Server: 128 characters
/// - MySQL: 64 characters (checked by the server itself)
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Punctuation allowed in identifiers besides ASCII letters and digits.
const ALLOWED_PUNCTUATION: &[char] = &['_', '$', '#', '@', ' ', '-'];

/// Validate an identifier against the allow-list.
///
/// Accepts letters (any script), digits, and `_ $ # @ - <space>`. The name
/// must not be empty, must not start or end with a space, and must fit in
/// [`MAX_IDENTIFIER_LENGTH`] bytes.
///
/// # Errors
///
/// Returns `SyncError::Config` naming the offending identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::config("Identifier cannot be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(SyncError::config(format!(
            "Identifier has leading or trailing whitespace: {:?}",
            name
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(c)))
    {
        return Err(SyncError::config(format!(
            "Identifier contains disallowed character {:?}: {:?}",
            bad, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name))
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}

/// Qualify a SQL Server table name with schema.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

/// Validate an operator-supplied SQL fragment (row filter or source query).
///
/// The fragment is executed verbatim against the source, so it is rejected
/// when it contains patterns used to smuggle extra statements:
///
/// - Semicolons (a single trailing one is tolerated and must be stripped by
///   the caller with [`trim_statement`])
/// - SQL comments (`--`, `/*`, `*/`)
/// - `EXEC`/`EXECUTE` keywords
/// - Known dangerous stored procedures (`xp_cmdshell`, `sp_executesql`, ...)
pub fn validate_sql_fragment(fragment: &str) -> Result<()> {
    let trimmed = trim_statement(fragment);
    let lower = trimmed.to_lowercase();

    if trimmed.is_empty() {
        return Err(SyncError::config("SQL fragment cannot be empty"));
    }

    if trimmed.contains(';') {
        return Err(SyncError::config(format!(
            "SQL fragment contains a statement separator: {:?}",
            fragment
        )));
    }

    if trimmed.contains("--") || trimmed.contains("/*") || trimmed.contains("*/") {
        return Err(SyncError::config(format!(
            "SQL fragment contains comment markers: {:?}",
            fragment
        )));
    }

    if lower.split_whitespace().any(|word| {
        word == "exec"
            || word == "execute"
            || word.starts_with("exec(")
            || word.starts_with("execute(")
    }) {
        return Err(SyncError::config(format!(
            "SQL fragment contains EXEC/EXECUTE keyword: {:?}",
            fragment
        )));
    }

    const DANGEROUS_PROCEDURES: &[&str] = &[
        "xp_cmdshell",
        "xp_regread",
        "xp_regwrite",
        "xp_regdelete",
        "xp_dirtree",
        "xp_fileexist",
        "xp_subdirs",
        "sp_executesql",
        "sp_execute",
        "sp_oacreate",
        "sp_oamethod",
        "sp_addextendedproc",
        "sp_configure",
    ];

    for proc in DANGEROUS_PROCEDURES {
        for (idx, _) in lower.match_indices(proc) {
            let before_ok = lower[..idx]
                .chars()
                .last()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            let after_ok = lower[idx + proc.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');

            if before_ok && after_ok {
                return Err(SyncError::config(format!(
                    "SQL fragment calls dangerous procedure '{}': {:?}",
                    proc, fragment
                )));
            }
        }
    }

    Ok(())
}

/// Strip surrounding whitespace and one trailing semicolon.
pub fn trim_statement(fragment: &str) -> &str {
    let trimmed = fragment.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("Table123").is_ok());
        assert!(validate_identifier("Order Details").is_ok());
        assert!(validate_identifier("Ürün").is_ok());
        assert!(validate_identifier("#temp").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_quote_characters() {
        assert!(validate_identifier("table`name").is_err());
        assert!(validate_identifier("table]name").is_err());
        assert!(validate_identifier("table\"name").is_err());
        assert!(validate_identifier("a'b").is_err());
        assert!(validate_identifier("x;DROP TABLE y").is_err());
        assert!(validate_identifier("table\0name").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_padding() {
        assert!(validate_identifier(" users").is_err());
        assert!(validate_identifier("users ").is_err());
    }

    #[test]
    fn test_validate_identifier_length() {
        let max_name = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max_name).is_ok());
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_and_qualify() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mssql("users").unwrap(), "[users]");
        assert_eq!(qualify_mysql("portal", "users").unwrap(), "`portal`.`users`");
        assert_eq!(qualify_mssql("dbo", "users").unwrap(), "[dbo].[users]");
        assert!(qualify_mssql("dbo", "").is_err());
        assert!(qualify_mysql("db`x", "users").is_err());
    }

    #[test]
    fn test_sql_fragment_valid() {
        assert!(validate_sql_fragment("Active = 1").is_ok());
        assert!(validate_sql_fragment("Status IN ('A', 'B') AND Total > 0").is_ok());
        assert!(validate_sql_fragment("SELECT Id, Name FROM dbo.Customers WHERE Deleted = 0;").is_ok());
        assert!(validate_sql_fragment("role = 'executive'").is_ok());
        assert!(validate_sql_fragment("sp_rate > 0").is_ok());
    }

    #[test]
    fn test_sql_fragment_rejects_injection() {
        assert!(validate_sql_fragment("1=1; DROP TABLE users").is_err());
        assert!(validate_sql_fragment("1=1 -- bypass").is_err());
        assert!(validate_sql_fragment("1=1 /* x */").is_err());
        assert!(validate_sql_fragment("EXEC something").is_err());
        assert!(validate_sql_fragment("1 = xp_cmdshell('dir')").is_err());
        assert!(validate_sql_fragment("   ").is_err());
    }

    #[test]
    fn test_trim_statement() {
        assert_eq!(trim_statement("  SELECT 1 ; "), "SELECT 1");
        assert_eq!(trim_statement("SELECT 1"), "SELECT 1");
    }
}
