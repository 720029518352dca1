//! Table operations.
//!
//! A table is described by a list of operations. The current schema uses only
//! the additive ones; downgrades may also drop columns, constraints or the
//! whole table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationScope {
    /// The table itself.
    WholeTable,
    /// A single column.
    Column,
    /// A table-level constraint.
    TableConstraint,
}

/// Identity of an operation within one table.
///
/// Two operations with the same identity touch the same column, constraint
/// or table, so they cannot appear in the same schema part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    /// What the operation applies to.
    pub scope: OperationScope,
    /// Column name, constraint text, or empty for the whole table.
    pub key: String,
}

impl OperationId {
    fn new(scope: OperationScope, key: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            OperationScope::WholeTable => f.write_str("table"),
            OperationScope::Column => write!(f, "column {}", self.key),
            OperationScope::TableConstraint => write!(f, "constraint '{}'", self.key),
        }
    }
}

/// A single change to a table's structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableOperation {
    /// Defines or redefines a column.
    AddColumn {
        /// Column name.
        name: String,
        /// Type and column constraints, e.g. `INTEGER NOT NULL`.
        definition: String,
    },

    /// Removes a column. Downgrades only.
    DropColumn {
        /// Column name.
        name: String,
    },

    /// Adds a table-level constraint, identified by its literal text.
    AddConstraint {
        /// Constraint text, e.g. `UNIQUE (email)`.
        definition: String,
    },

    /// Removes the constraint with exactly this text. Downgrades only.
    DropConstraint {
        /// Constraint text.
        definition: String,
    },

    /// The table does not exist at the older revision. Downgrades only.
    DropTable,
}

impl TableOperation {
    /// Creates an AddColumn operation.
    #[must_use]
    pub fn add_column(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self::AddColumn {
            name: name.into(),
            definition: definition.into(),
        }
    }

    /// Creates a DropColumn operation.
    #[must_use]
    pub fn drop_column(name: impl Into<String>) -> Self {
        Self::DropColumn { name: name.into() }
    }

    /// Creates an AddConstraint operation.
    #[must_use]
    pub fn add_constraint(definition: impl Into<String>) -> Self {
        Self::AddConstraint {
            definition: definition.into(),
        }
    }

    /// Creates a DropConstraint operation.
    #[must_use]
    pub fn drop_constraint(definition: impl Into<String>) -> Self {
        Self::DropConstraint {
            definition: definition.into(),
        }
    }

    /// Returns the identity used for duplicate detection and merging.
    #[must_use]
    pub fn id(&self) -> OperationId {
        match self {
            Self::AddColumn { name, .. } | Self::DropColumn { name } => {
                OperationId::new(OperationScope::Column, name.as_str())
            }
            Self::AddConstraint { definition } | Self::DropConstraint { definition } => {
                OperationId::new(OperationScope::TableConstraint, definition.as_str())
            }
            Self::DropTable => OperationId::new(OperationScope::WholeTable, ""),
        }
    }

    /// Returns true for operations that remove something.
    #[must_use]
    pub const fn is_drop(&self) -> bool {
        match self {
            Self::AddColumn { .. } | Self::AddConstraint { .. } => false,
            Self::DropColumn { .. } | Self::DropConstraint { .. } | Self::DropTable => true,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AddColumn { name, definition } => format!("AddColumn({name} {definition})"),
            Self::DropColumn { name } => format!("DropColumn({name})"),
            Self::AddConstraint { definition } => format!("AddConstraint({definition})"),
            Self::DropConstraint { definition } => format!("DropConstraint({definition})"),
            Self::DropTable => "DropTable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_drop_column_share_identity() {
        let add = TableOperation::add_column("email", "TEXT");
        let drop = TableOperation::drop_column("email");

        assert_eq!(add.id(), drop.id());
        assert_eq!(add.id().scope, OperationScope::Column);
    }

    #[test]
    fn test_constraint_identity_is_its_text() {
        let add = TableOperation::add_constraint("UNIQUE (email)");

        assert_eq!(add.id(), TableOperation::drop_constraint("UNIQUE (email)").id());
        assert_ne!(add.id(), TableOperation::drop_constraint("UNIQUE(email)").id());
    }

    #[test]
    fn test_column_and_constraint_scopes_differ() {
        // A constraint whose text happens to equal a column name is still distinct.
        let column = TableOperation::add_column("x", "TEXT");
        let constraint = TableOperation::add_constraint("x");

        assert_ne!(column.id(), constraint.id());
    }

    #[test]
    fn test_drop_table_identity() {
        let id = TableOperation::DropTable.id();
        assert_eq!(id.scope, OperationScope::WholeTable);
        assert!(id.key.is_empty());
    }

    #[test]
    fn test_is_drop() {
        assert!(!TableOperation::add_column("id", "INTEGER").is_drop());
        assert!(!TableOperation::add_constraint("UNIQUE (id)").is_drop());
        assert!(TableOperation::drop_column("id").is_drop());
        assert!(TableOperation::drop_constraint("UNIQUE (id)").is_drop());
        assert!(TableOperation::DropTable.is_drop());
    }

    #[test]
    fn test_description() {
        assert_eq!(
            TableOperation::add_column("id", "INTEGER").description(),
            "AddColumn(id INTEGER)"
        );
        assert_eq!(TableOperation::DropTable.description(), "DropTable");
    }
}
