//! SQL statement generation.
//!
//! Table and column names are emitted verbatim: they come from the schema
//! declaration, which is trusted code.

use crate::error::{Result, SchemaError};
use crate::operations::TableOperation;

/// Renders `CREATE TABLE <name>(<columns>, <constraints>)`.
///
/// Columns come first, then constraints, each group in declaration order.
/// Only resolved operation lists are accepted; any drop is an error.
pub fn create_table(table: &str, operations: &[TableOperation]) -> Result<String> {
    let mut columns = Vec::new();
    let mut constraints = Vec::new();

    for op in operations {
        match op {
            TableOperation::AddColumn { name, definition } => {
                columns.push(format!("{name} {definition}"));
            }
            TableOperation::AddConstraint { definition } => {
                constraints.push(definition.clone());
            }
            TableOperation::DropColumn { .. }
            | TableOperation::DropConstraint { .. }
            | TableOperation::DropTable => {
                return Err(SchemaError::UnresolvedOperation {
                    table: table.to_string(),
                    operation: op.description(),
                });
            }
        }
    }

    columns.extend(constraints);
    Ok(format!("CREATE TABLE {}({})", table, columns.join(", ")))
}

/// Renders `DROP TABLE <name>`.
#[must_use]
pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {table}")
}

/// Renders `DROP TABLE IF EXISTS <name>`.
#[must_use]
pub fn drop_table_if_exists(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

/// Renders `ALTER TABLE <old> RENAME TO <new>`.
#[must_use]
pub fn rename_table(old_name: &str, new_name: &str) -> String {
    format!("ALTER TABLE {old_name} RENAME TO {new_name}")
}

/// Renders `INSERT INTO <table>(<columns>) SELECT <expressions> FROM <source>`.
#[must_use]
pub fn insert_select(table: &str, columns: &[&str], expressions: &[&str], source: &str) -> String {
    format!(
        "INSERT INTO {}({}) SELECT {} FROM {}",
        table,
        columns.join(", "),
        expressions.join(", "),
        source
    )
}

/// Renders `PRAGMA foreign_keys = ON|OFF`.
#[must_use]
pub fn foreign_keys(enabled: bool) -> String {
    format!("PRAGMA foreign_keys = {}", on_off(enabled))
}

/// Renders `PRAGMA legacy_alter_table = ON|OFF`.
///
/// With the legacy behaviour and foreign keys off, renaming a table leaves
/// the `REFERENCES` clauses of other tables untouched.
#[must_use]
pub fn legacy_alter_table(enabled: bool) -> String {
    format!("PRAGMA legacy_alter_table = {}", on_off(enabled))
}

const fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}
