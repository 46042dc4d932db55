//! SQL Server query text for the source reader.
//!
//! Identifiers are validated and bracket-quoted. Ids are bound as `@P1`.
//! Operator predicates and queries are screened at config load and inserted
//! verbatim.

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::traits::{Field, RowSource};
use crate::error::Result;
use crate::typemap::SourceType;

/// Live column metadata, identity seed and increment included.
///
/// `@P1` schema, `@P2` table, `@P3` the bracket-qualified name for
/// `OBJECT_ID`.
pub const DESCRIBE_TABLE: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS INT),
        CAST(c.NUMERIC_PRECISION AS INT),
        CAST(c.NUMERIC_SCALE AS INT),
        CAST(c.DATETIME_PRECISION AS INT),
        CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
        CAST(ISNULL(COLUMNPROPERTY(OBJECT_ID(@P3), c.COLUMN_NAME, 'IsIdentity'), 0) AS INT),
        CAST(IDENT_SEED(@P3) AS BIGINT),
        CAST(IDENT_INCR(@P3) AS BIGINT),
        CAST(c.ORDINAL_POSITION AS INT)
    FROM INFORMATION_SCHEMA.COLUMNS c
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

/// Select-list entry for one field.
///
/// xml has no direct string decoding, so it is read as NVARCHAR(MAX). Money
/// travels as a float on the wire and is read as DECIMAL to keep every digit.
fn select_item(field: &Field) -> Result<String> {
    let quoted = quote_mssql(&field.name)?;
    let cast = match field.source_type {
        SourceType::Xml => "NVARCHAR(MAX)",
        SourceType::Money => "DECIMAL(19,4)",
        SourceType::SmallMoney => "DECIMAL(10,4)",
        _ => return Ok(quoted),
    };
    Ok(format!("CAST({} AS {}) AS {}", quoted, cast, quoted))
}

fn select_list(fields: &[Field]) -> Result<String> {
    Ok(fields
        .iter()
        .map(select_item)
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Query producing the rows of `source`.
///
/// Table mode projects onto `fields`; query mode runs the operator query as
/// is and fields are picked from its result by name.
pub fn select_rows(source: &RowSource, fields: &[Field]) -> Result<String> {
    match source {
        RowSource::Table {
            schema,
            table,
            conditions,
        } => {
            let mut sql = format!(
                "SELECT {} FROM {}",
                select_list(fields)?,
                qualify_mssql(schema, table)?
            );
            if let Some(conditions) = conditions {
                sql.push_str(&format!(" WHERE ({})", conditions));
            }
            Ok(sql)
        }
        RowSource::Query(query) => Ok(query.clone()),
    }
}

/// Query for one table row by id, bound as `@P1`.
pub fn select_by_id(schema: &str, table: &str, id_column: &str, fields: &[Field]) -> Result<String> {
    Ok(format!(
        "SELECT {} FROM {} WHERE {} = @P1",
        select_list(fields)?,
        qualify_mssql(schema, table)?,
        quote_mssql(id_column)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<Field> {
        vec![
            Field::new("Id", SourceType::Int),
            Field::new("Doc", SourceType::Xml),
        ]
    }

    #[test]
    fn test_select_rows_table_mode() {
        let source = RowSource::Table {
            schema: "dbo".into(),
            table: "Orders".into(),
            conditions: Some("Status = 'open'".into()),
        };
        assert_eq!(
            select_rows(&source, &fields()).unwrap(),
            "SELECT [Id], CAST([Doc] AS NVARCHAR(MAX)) AS [Doc] FROM [dbo].[Orders] WHERE (Status = 'open')"
        );
    }

    #[test]
    fn test_select_rows_without_conditions() {
        let source = RowSource::Table {
            schema: "sales".into(),
            table: "Order Lines".into(),
            conditions: None,
        };
        assert_eq!(
            select_rows(&source, &fields()[..1]).unwrap(),
            "SELECT [Id] FROM [sales].[Order Lines]"
        );
    }

    #[test]
    fn test_query_mode_runs_query_verbatim() {
        let source = RowSource::Query("SELECT Id FROM dbo.Orders WHERE Id > 10".into());
        assert_eq!(
            select_rows(&source, &fields()).unwrap(),
            "SELECT Id FROM dbo.Orders WHERE Id > 10"
        );
    }

    #[test]
    fn test_select_by_id() {
        assert_eq!(
            select_by_id("dbo", "Orders", "Id", &fields()[..1]).unwrap(),
            "SELECT [Id] FROM [dbo].[Orders] WHERE [Id] = @P1"
        );
    }

    #[test]
    fn test_money_is_selected_as_decimal() {
        let fields = vec![
            Field::new("Id", SourceType::Int),
            Field::new("Total", SourceType::Money),
            Field::new("Fee", SourceType::SmallMoney),
        ];
        assert_eq!(
            select_by_id("dbo", "Orders", "Id", &fields).unwrap(),
            "SELECT [Id], CAST([Total] AS DECIMAL(19,4)) AS [Total], \
             CAST([Fee] AS DECIMAL(10,4)) AS [Fee] FROM [dbo].[Orders] WHERE [Id] = @P1"
        );
    }

    #[test]
    fn test_rejects_bracket_in_identifier() {
        assert!(select_by_id("dbo", "Orders]; DROP TABLE x", "Id", &fields()).is_err());
    }
}
