//! Schema parts and reconstructed revisions.
//!
//! A [`TableDefinition`] describes a table in the current schema, a
//! [`TableDowngrade`] describes how a table differed one revision earlier.
//! Both are validated on construction. A [`Revision`] is the resolved shape
//! of every table at one schema version.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, SchemaError};
use crate::operations::TableOperation;
use crate::statement;

/// Resolved tables of one revision, keyed by table name.
pub type TableMap = BTreeMap<String, Vec<TableOperation>>;

/// A table as declared in the current schema.
///
/// # Example
///
/// ```rust
/// use oxide_schemas::prelude::*;
///
/// let contacts = TableDefinition::new(
///     "contacts",
///     vec![
///         TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
///         TableOperation::add_column("email", "TEXT"),
///         TableOperation::add_constraint("UNIQUE (email)"),
///     ],
/// )
/// .unwrap();
///
/// assert_eq!(contacts.name(), "contacts");
/// assert_eq!(contacts.operations().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    name: String,
    operations: Vec<TableOperation>,
}

impl TableDefinition {
    /// Creates a table definition, rejecting empty, duplicated or drop operations.
    pub fn new(name: impl Into<String>, operations: Vec<TableOperation>) -> Result<Self> {
        let name = name.into();
        validate_operations(&name, &operations)?;

        if let Some(op) = operations.iter().find(|op| op.is_drop()) {
            return Err(SchemaError::DropInDefinition {
                table: name,
                operation: op.description(),
            });
        }

        Ok(Self { name, operations })
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the operations in declaration order.
    #[must_use]
    pub fn operations(&self) -> &[TableOperation] {
        &self.operations
    }

    pub(crate) fn into_parts(self) -> (String, Vec<TableOperation>) {
        (self.name, self.operations)
    }
}

/// How a table looked one revision before the revision it is declared for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDowngrade {
    name: String,
    operations: Vec<TableOperation>,
}

impl TableDowngrade {
    /// Creates a table downgrade, rejecting empty or duplicated operations
    /// and `DropTable` mixed with anything else.
    pub fn new(name: impl Into<String>, operations: Vec<TableOperation>) -> Result<Self> {
        let name = name.into();
        validate_operations(&name, &operations)?;
        Ok(Self { name, operations })
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the operations in declaration order.
    #[must_use]
    pub fn operations(&self) -> &[TableOperation] {
        &self.operations
    }

    pub(crate) fn into_parts(self) -> (String, Vec<TableOperation>) {
        (self.name, self.operations)
    }
}

/// Declares that a table did not exist at the older revision.
#[must_use]
pub fn drop_table(name: impl Into<String>) -> TableDowngrade {
    TableDowngrade {
        name: name.into(),
        operations: vec![TableOperation::DropTable],
    }
}

fn validate_operations(table: &str, operations: &[TableOperation]) -> Result<()> {
    if operations.is_empty() {
        return Err(SchemaError::EmptyTable {
            table: table.to_string(),
        });
    }

    if operations.len() > 1 && operations.contains(&TableOperation::DropTable) {
        return Err(SchemaError::DropTableMixed {
            table: table.to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(operations.len());
    for op in operations {
        let id = op.id();
        if seen.contains(&id) {
            return Err(SchemaError::DuplicateOperation {
                table: table.to_string(),
                id,
            });
        }
        seen.insert(id);
    }

    Ok(())
}

/// The resolved schema at one revision.
///
/// Every table holds only `AddColumn` and `AddConstraint` operations; a table
/// that is absent did not exist at this revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
    version: i32,
    tables: Arc<TableMap>,
}

impl Revision {
    pub(crate) const fn new(version: i32, tables: Arc<TableMap>) -> Self {
        Self { version, tables }
    }

    /// Returns the schema version this revision describes.
    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Returns the names of all tables existing at this revision.
    #[must_use]
    pub fn tables(&self) -> BTreeSet<String> {
        self.tables.keys().cloned().collect()
    }

    /// Returns true if the table exists at this revision.
    #[must_use]
    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Returns the resolved operations of a table.
    #[must_use]
    pub fn operations(&self, table: &str) -> Option<&[TableOperation]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Returns the column names of a table. Constraints are ignored.
    pub fn columns(&self, table: &str) -> Result<BTreeSet<String>> {
        let operations = self.table(table)?;
        let mut columns = BTreeSet::new();
        for op in operations {
            match op {
                TableOperation::AddColumn { name, .. } => {
                    columns.insert(name.clone());
                }
                TableOperation::AddConstraint { .. } => {}
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
        Ok(columns)
    }

    /// Returns the `CREATE TABLE` statement of a table at this revision.
    pub fn create_table_statement(&self, table: &str) -> Result<String> {
        statement::create_table(table, self.table(table)?)
    }

    pub(crate) const fn shared_tables(&self) -> &Arc<TableMap> {
        &self.tables
    }

    fn table(&self, table: &str) -> Result<&[TableOperation]> {
        self.operations(table)
            .ok_or_else(|| SchemaError::UnknownTable {
                table: table.to_string(),
                version: self.version,
            })
    }
}
