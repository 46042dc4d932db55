//! MySQL statement builders.
//!
//! Every builder returns a [`Statement`]: SQL text with `?` placeholders and
//! the values bound to them. Identifiers are validated and backtick-quoted;
//! values never enter the SQL text.

use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::IdValue;
use crate::core::traits::{Field, TargetColumn};
use crate::core::value::SqlValue;
use crate::error::Result;

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    fn with_params(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    /// The statement with each placeholder replaced by its literal, for logs.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut params = self.params.iter();
        let mut in_ident = false;
        for c in self.sql.chars() {
            match c {
                '`' => {
                    in_ident = !in_ident;
                    out.push(c);
                }
                '?' if !in_ident => match params.next() {
                    Some(value) => out.push_str(&value.to_mysql_literal()),
                    None => out.push(c),
                },
                _ => out.push(c),
            }
        }
        out
    }
}

/// Builds statements against tables of one MySQL database.
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    database: String,
}

impl MysqlDialect {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn table(&self, table: &str) -> Result<String> {
        qualify_mysql(&self.database, table)
    }

    pub fn table_exists(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
                .to_string(),
            vec![
                SqlValue::Text(self.database.clone()),
                SqlValue::Text(table.to_string()),
            ],
        )
    }

    /// Column names in ordinal order. CAST avoids information_schema
    /// collation mismatches.
    pub fn column_names(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
                .to_string(),
            vec![
                SqlValue::Text(self.database.clone()),
                SqlValue::Text(table.to_string()),
            ],
        )
    }

    pub fn create_table(
        &self,
        table: &str,
        columns: &[TargetColumn],
        primary_key: Option<&str>,
    ) -> Result<Statement> {
        let mut defs = Vec::with_capacity(columns.len() + 1);
        for column in columns {
            defs.push(format!(
                "{} {}",
                quote_mysql(&column.name)?,
                column.definition.render()
            ));
        }
        if let Some(pk) = primary_key {
            defs.push(format!("PRIMARY KEY ({})", quote_mysql(pk)?));
        }

        Ok(Statement::new(format!(
            "CREATE TABLE {} (\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table(table)?,
            defs.join(",\n    ")
        )))
    }

    /// Table options take no placeholders; the seed is an integer literal.
    pub fn set_auto_increment(&self, table: &str, seed: i64) -> Result<Statement> {
        Ok(Statement::new(format!(
            "ALTER TABLE {} AUTO_INCREMENT = {}",
            self.table(table)?,
            seed
        )))
    }

    pub fn add_column(&self, table: &str, column: &TargetColumn) -> Result<Statement> {
        Ok(Statement::new(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table(table)?,
            quote_mysql(&column.name)?,
            column.definition.render_additive()
        )))
    }

    pub fn select_ids(&self, table: &str, id: &Field) -> Result<Statement> {
        Ok(Statement::new(format!(
            "SELECT {} FROM {}",
            quote_mysql(&id.name)?,
            self.table(table)?
        )))
    }

    pub fn select_row(
        &self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        fields: &[Field],
    ) -> Result<Statement> {
        let columns = fields
            .iter()
            .map(|f| quote_mysql(&f.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Statement::with_params(
            format!(
                "SELECT {} FROM {} WHERE {} = ?",
                columns.join(", "),
                self.table(table)?,
                quote_mysql(id_column)?
            ),
            vec![id.to_sql_value()],
        ))
    }

    pub fn delete(&self, table: &str, id_column: &str, id: &IdValue) -> Result<Statement> {
        Ok(Statement::with_params(
            format!(
                "DELETE FROM {} WHERE {} = ?",
                self.table(table)?,
                quote_mysql(id_column)?
            ),
            vec![id.to_sql_value()],
        ))
    }

    pub fn insert(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<Statement> {
        let quoted = columns
            .iter()
            .map(|c| quote_mysql(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Statement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table(table)?,
                quoted.join(", "),
                vec!["?"; columns.len()].join(", ")
            ),
            values.to_vec(),
        ))
    }

    pub fn update(
        &self,
        table: &str,
        id_column: &str,
        id: &IdValue,
        assignments: &[(String, SqlValue)],
    ) -> Result<Statement> {
        let sets = assignments
            .iter()
            .map(|(column, _)| quote_mysql(column).map(|q| format!("{} = ?", q)))
            .collect::<Result<Vec<_>>>()?;
        let mut params: Vec<SqlValue> = assignments.iter().map(|(_, v)| v.clone()).collect();
        params.push(id.to_sql_value());

        Ok(Statement::with_params(
            format!(
                "UPDATE {} SET {} WHERE {} = ?",
                self.table(table)?,
                sets.join(", "),
                quote_mysql(id_column)?
            ),
            params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceColumn;
    use crate::typemap::{map_column, SourceType};

    fn dialect() -> MysqlDialect {
        MysqlDialect::new("shop")
    }

    fn column(name: &str, source: SourceColumn) -> TargetColumn {
        TargetColumn {
            name: name.into(),
            definition: map_column("t", &source).unwrap(),
        }
    }

    #[test]
    fn test_create_table_with_primary_key() {
        let stmt = dialect()
            .create_table(
                "customers",
                &[
                    column("id", SourceColumn::new("Id", "int").with_identity(1, 1)),
                    column("name", SourceColumn::new("Name", "nvarchar").with_length(50)),
                ],
                Some("id"),
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "CREATE TABLE `shop`.`customers` (\n    `id` INT AUTO_INCREMENT,\n    `name` VARCHAR(50),\n    PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_add_column_never_auto_increments() {
        let stmt = dialect()
            .add_column(
                "customers",
                &column("id", SourceColumn::new("Id", "bigint").with_identity(1, 1)),
            )
            .unwrap();
        assert_eq!(stmt.sql, "ALTER TABLE `shop`.`customers` ADD COLUMN `id` BIGINT");
    }

    #[test]
    fn test_update_binds_values_then_id() {
        let stmt = dialect()
            .update(
                "customers",
                "id",
                &IdValue::Int(3),
                &[
                    ("name".into(), SqlValue::Text("O'Hara".into())),
                    ("photo".into(), SqlValue::Bytes(vec![0xDE, 0xAD])),
                ],
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE `shop`.`customers` SET `name` = ?, `photo` = ? WHERE `id` = ?"
        );
        assert_eq!(
            stmt.render(),
            "UPDATE `shop`.`customers` SET `name` = 'O''Hara', `photo` = X'DEAD' WHERE `id` = 3"
        );
    }

    #[test]
    fn test_insert_renders_literals() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 600)
            .unwrap();
        let stmt = dialect()
            .insert(
                "customers",
                &["id".into(), "seen".into(), "note".into()],
                &[SqlValue::I32(1), SqlValue::DateTime(ts), SqlValue::Null],
            )
            .unwrap();
        assert_eq!(
            stmt.render(),
            "INSERT INTO `shop`.`customers` (`id`, `seen`, `note`) VALUES (1, '2024-01-02 03:04:05.000600', NULL)"
        );
    }

    #[test]
    fn test_placeholder_inside_identifier_is_not_substituted() {
        let stmt = Statement::with_params(
            "SELECT `a?b` FROM t WHERE x = ?".into(),
            vec![SqlValue::I64(1)],
        );
        assert_eq!(stmt.render(), "SELECT `a?b` FROM t WHERE x = 1");
    }

    #[test]
    fn test_select_row_and_delete() {
        let d = dialect();
        let fields = vec![
            Field::new("id", SourceType::Int),
            Field::new("name", SourceType::NVarChar),
        ];
        let select = d
            .select_row("customers", "id", &IdValue::String("A-1".into()), &fields)
            .unwrap();
        assert_eq!(
            select.render(),
            "SELECT `id`, `name` FROM `shop`.`customers` WHERE `id` = 'A-1'"
        );

        let delete = d.delete("customers", "id", &IdValue::Int(4)).unwrap();
        assert_eq!(delete.render(), "DELETE FROM `shop`.`customers` WHERE `id` = 4");
    }

    #[test]
    fn test_rejects_unsafe_identifier() {
        assert!(dialect().select_ids("cust`omers", &Field::new("id", SourceType::Int)).is_err());
    }

    #[test]
    fn test_auto_increment_literal() {
        let stmt = dialect().set_auto_increment("customers", 1).unwrap();
        assert_eq!(stmt.sql, "ALTER TABLE `shop`.`customers` AUTO_INCREMENT = 1");
    }
}
