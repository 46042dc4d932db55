//! Target schema reconciliation.
//!
//! Creates a missing target table or adds mapped columns the target lacks.
//! Nothing is ever dropped, renamed or retyped.

use tracing::{debug, info};

use crate::config::ResolvedTable;
use crate::core::traits::{TargetColumn, TargetWriter};
use crate::error::Result;
use crate::plan::TablePlan;

/// What `ensure` did to the target table.
#[derive(Debug, Clone)]
pub struct SchemaOutcome {
    /// Column plan used by the row pass.
    pub plan: TablePlan,
    /// The table was created this cycle.
    pub created: bool,
    /// Columns added with `ALTER TABLE ... ADD COLUMN`.
    pub added_columns: Vec<String>,
}

/// Bring the target table in line with the resolved mapping.
///
/// The live source catalog travels in `resolved.source_columns`; a mapped
/// column missing there fails with `SchemaMismatch` before the target is
/// touched.
pub async fn ensure<T, F>(
    target: &mut T,
    resolved: &ResolvedTable,
    is_audit_column: F,
) -> Result<SchemaOutcome>
where
    T: TargetWriter + ?Sized,
    F: Fn(&str) -> bool,
{
    let plan = TablePlan::build(resolved, is_audit_column)?;
    let table = resolved.target_table.as_str();

    if !target.table_exists(table).await? {
        let added_columns = create(target, table, &plan).await?;
        return Ok(SchemaOutcome {
            plan,
            created: true,
            added_columns,
        });
    }

    let live = target.column_names(table).await?;
    let mut added_columns = Vec::new();
    for column in plan.columns() {
        if live.iter().any(|name| name.eq_ignore_ascii_case(&column.target)) {
            continue;
        }
        info!("{}: adding missing column {}", table, column.target);
        target.add_column(table, &column.target_column()).await?;
        added_columns.push(column.target.clone());
    }

    if added_columns.is_empty() {
        debug!("{}: schema up to date", table);
    }

    Ok(SchemaOutcome {
        plan,
        created: false,
        added_columns,
    })
}

/// Create the table from the comparable columns, then add the rest.
///
/// Returns the columns added after creation.
async fn create<T>(target: &mut T, table: &str, plan: &TablePlan) -> Result<Vec<String>>
where
    T: TargetWriter + ?Sized,
{
    let comparable: Vec<TargetColumn> = plan
        .columns()
        .iter()
        .filter(|c| c.is_comparable())
        .map(|c| c.target_column())
        .collect();

    let primary_key = comparable
        .iter()
        .find(|c| c.definition.is_primary_key)
        .map(|c| c.name.clone());
    let seed = comparable
        .iter()
        .find(|c| c.definition.is_auto_increment)
        .and_then(|c| c.definition.auto_increment_seed);

    info!(
        "{}: creating table with {} columns (primary key: {})",
        table,
        comparable.len(),
        primary_key.as_deref().unwrap_or("none")
    );
    target
        .create_table(table, &comparable, primary_key.as_deref())
        .await?;

    if let Some(seed) = seed {
        target.set_auto_increment(table, seed).await?;
    }

    let mut added = Vec::new();
    for column in plan.non_comparable() {
        target.add_column(table, &column.target_column()).await?;
        added.push(column.target.clone());
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, TableSyncSpec};
    use crate::core::schema::SourceColumn;
    use crate::error::SyncError;
    use crate::testing::{FakeTarget, TargetOp};

    fn live() -> Vec<SourceColumn> {
        vec![
            SourceColumn::new("Id", "int").with_identity(1, 1),
            SourceColumn::new("Name", "nvarchar").with_length(50),
            SourceColumn::new("Photo", "varbinary").with_length(-1),
            SourceColumn::new("MODIFY_DATE", "datetime2"),
        ]
    }

    fn resolved(columns: &[(&str, &str)], live: Vec<SourceColumn>) -> ResolvedTable {
        let spec = TableSyncSpec {
            source_table: "Customers".into(),
            target_table: Some("customers".into()),
            id_column: Some("Id".into()),
            columns: Some(
                columns
                    .iter()
                    .map(|(s, t)| (s.to_string(), t.to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        resolve(&spec, "dbo", live).unwrap()
    }

    fn all_columns() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Id", "id"),
            ("Name", "name"),
            ("Photo", "photo"),
            ("MODIFY_DATE", "modified"),
        ]
    }

    fn no_audit(_: &str) -> bool {
        false
    }

    #[tokio::test]
    async fn test_creates_missing_table() {
        let mut target = FakeTarget::new();
        let outcome = ensure(&mut target, &resolved(&all_columns(), live()), no_audit)
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.added_columns, vec!["photo".to_string()]);
        assert_eq!(
            target.ops,
            vec![
                TargetOp::CreateTable {
                    table: "customers".into(),
                    columns: vec!["id".into(), "name".into(), "modified".into()],
                    primary_key: Some("id".into()),
                },
                TargetOp::SetAutoIncrement {
                    table: "customers".into(),
                    seed: 1,
                },
                TargetOp::AddColumn {
                    table: "customers".into(),
                    column: "photo".into(),
                    definition: "LONGBLOB".into(),
                },
            ]
        );
        let created = target.table("customers").unwrap();
        assert_eq!(created.columns.len(), 4);
        assert!(created.columns[0].definition.is_auto_increment);
    }

    #[tokio::test]
    async fn test_identity_not_seeded_at_one_gets_no_key() {
        let mut columns = live();
        columns[0] = SourceColumn::new("Id", "int").with_identity(1000, 1);
        let mut target = FakeTarget::new();
        ensure(&mut target, &resolved(&all_columns(), columns), no_audit)
            .await
            .unwrap();

        assert!(matches!(
            &target.ops[0],
            TargetOp::CreateTable { primary_key: None, .. }
        ));
        assert!(!target
            .ops
            .iter()
            .any(|op| matches!(op, TargetOp::SetAutoIncrement { .. })));
    }

    #[tokio::test]
    async fn test_adds_only_missing_columns() {
        let mut target = FakeTarget::new().with_table("customers", &["ID", "Name"], Vec::new());
        let outcome = ensure(&mut target, &resolved(&all_columns(), live()), no_audit)
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.added_columns, vec!["photo", "modified"]);
        assert_eq!(
            target.ops[1],
            TargetOp::AddColumn {
                table: "customers".into(),
                column: "modified".into(),
                definition: "DATETIME(6)".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_added_identity_column_has_no_auto_increment() {
        let mut target = FakeTarget::new().with_table("customers", &["name"], Vec::new());
        ensure(&mut target, &resolved(&[("Id", "id"), ("Name", "name")], live()), no_audit)
            .await
            .unwrap();
        assert_eq!(
            target.ops,
            vec![TargetOp::AddColumn {
                table: "customers".into(),
                column: "id".into(),
                definition: "INT".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_up_to_date_table_is_untouched() {
        let mut target = FakeTarget::new().with_table(
            "customers",
            &["id", "name", "photo", "modified"],
            Vec::new(),
        );
        let outcome = ensure(&mut target, &resolved(&all_columns(), live()), no_audit)
            .await
            .unwrap();
        assert!(outcome.added_columns.is_empty());
        assert!(target.ops.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_column_touches_nothing() {
        let mut target = FakeTarget::new();
        let err = ensure(
            &mut target,
            &resolved(&[("Id", "id"), ("Email", "email")], live()),
            no_audit,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::SchemaMismatch { .. }));
        assert!(target.ops.is_empty());
    }
}
