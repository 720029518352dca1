//! Backward merge of one downgrade step.
//!
//! Given the tables at revision `r + 1` and the downgrade declared at `r`,
//! [`merge`] produces the tables at revision `r`.

use std::collections::BTreeMap;

use crate::error::{Result, SchemaError};
use crate::operations::TableOperation;
use crate::schema::TableMap;

/// Downgrade operations of one revision, keyed by table name.
pub type DowngradeMap = BTreeMap<String, Vec<TableOperation>>;

/// Applies `downgrade` to `schema`, producing the schema at `target_revision`.
///
/// `describe` renders a revision for error messages; it is only called when
/// the merge fails. Nothing is returned on failure.
pub fn merge<F>(
    schema: &TableMap,
    downgrade: &DowngradeMap,
    target_revision: i32,
    describe: F,
) -> Result<TableMap>
where
    F: Fn(i32) -> String,
{
    let mut merged = TableMap::new();

    for (table, operations) in schema {
        match downgrade.get(table) {
            None => {
                merged.insert(table.clone(), operations.clone());
            }
            Some(downgrades) => {
                let operations =
                    merge_table(table, operations, downgrades, target_revision, &describe)?;
                if !operations.is_empty() {
                    merged.insert(table.clone(), operations);
                }
            }
        }
    }

    for (table, downgrades) in downgrade {
        if !schema.contains_key(table) {
            let operations = convert_table(table, downgrades, target_revision, &describe)?;
            merged.insert(table.clone(), operations);
        }
    }

    Ok(merged)
}

fn merge_table<F>(
    table: &str,
    current: &[TableOperation],
    downgrades: &[TableOperation],
    target_revision: i32,
    describe: &F,
) -> Result<Vec<TableOperation>>
where
    F: Fn(i32) -> String,
{
    let mut merged = current.to_vec();

    for op in downgrades {
        let position = {
            let id = op.id();
            merged.iter().position(|existing| existing.id() == id)
        };

        match op {
            TableOperation::AddColumn { .. } | TableOperation::AddConstraint { .. } => {
                match position {
                    Some(idx) => merged[idx] = op.clone(),
                    None => merged.push(op.clone()),
                }
            }
            TableOperation::DropColumn { name } => {
                let idx = position.ok_or_else(|| SchemaError::MissingColumn {
                    table: table.to_string(),
                    column: name.clone(),
                    revision: describe(target_revision),
                })?;
                merged.remove(idx);
            }
            TableOperation::DropConstraint { definition } => {
                let idx = position.ok_or_else(|| SchemaError::MissingConstraint {
                    table: table.to_string(),
                    constraint: definition.clone(),
                    revision: describe(target_revision),
                })?;
                merged.remove(idx);
            }
            TableOperation::DropTable => merged.clear(),
        }
    }

    Ok(merged)
}

/// Turns the downgrade of a table that is absent from the newer revision
/// into its definition. There is nothing to drop from such a table.
fn convert_table<F>(
    table: &str,
    downgrades: &[TableOperation],
    target_revision: i32,
    describe: &F,
) -> Result<Vec<TableOperation>>
where
    F: Fn(i32) -> String,
{
    downgrades
        .iter()
        .map(|op| match op {
            TableOperation::AddColumn { .. } | TableOperation::AddConstraint { .. } => {
                Ok(op.clone())
            }
            TableOperation::DropColumn { .. }
            | TableOperation::DropConstraint { .. }
            | TableOperation::DropTable => Err(SchemaError::MissingTable {
                table: table.to_string(),
                operation: op.description(),
                revision: describe(target_revision),
            }),
        })
        .collect()
}
