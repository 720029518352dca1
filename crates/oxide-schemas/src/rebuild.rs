//! Copy-based table rebuilds.
//!
//! SQLite cannot drop or redefine columns in place. A [`TableRebuild`] moves
//! the live table aside, creates the new shape under the original name and
//! copies every column the two shapes share, plus any explicitly mapped
//! columns, before dropping the old copy.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::Result;
use crate::statement;

/// Source of unique temporary table names for one upgrade run.
#[derive(Debug, Default)]
pub struct TempTableNames {
    next: AtomicUsize,
}

impl TempTableNames {
    /// Creates a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }

    /// Returns a fresh name derived from `table`.
    pub fn next_for(&self, table: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{table}_tmp_{n}")
    }
}

/// What a rebuild did with each column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Columns whose values were carried over, mapped ones included.
    pub copied: BTreeSet<String>,
    /// Old columns absent from the new shape. Their data is gone.
    pub dropped: BTreeSet<String>,
    /// New columns without a source; they hold the column default.
    pub defaulted: BTreeSet<String>,
}

/// Rebuild of one table into a new `CREATE TABLE` statement.
///
/// # Example
///
/// ```rust
/// use oxide_schemas::rebuild::TableRebuild;
///
/// let rebuild = TableRebuild::new("contacts", "CREATE TABLE contacts(id INTEGER, seen INTEGER)")
///     .with_mapping("seen", "0");
///
/// assert_eq!(rebuild.table(), "contacts");
/// assert_eq!(rebuild.mappings().get("seen").map(String::as_str), Some("0"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRebuild {
    table: String,
    create_statement: String,
    mappings: BTreeMap<String, String>,
}

impl TableRebuild {
    /// Creates a rebuild without explicit mappings.
    pub fn new(table: impl Into<String>, create_statement: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            create_statement: create_statement.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Fills `new_column` from `expression`, evaluated against the old table.
    ///
    /// A later mapping for the same column replaces the earlier one.
    #[must_use]
    pub fn with_mapping(
        mut self,
        new_column: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.mappings.insert(new_column.into(), expression.into());
        self
    }

    /// Adds several mappings at once.
    #[must_use]
    pub fn with_mappings<I, K, V>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.mappings
            .extend(mappings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Returns the rebuilt table's name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the statement creating the new shape.
    #[must_use]
    pub fn create_statement(&self) -> &str {
        &self.create_statement
    }

    /// Returns the explicit mappings, keyed by new column.
    #[must_use]
    pub const fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }

    /// Runs the rebuild.
    ///
    /// The renames run with `legacy_alter_table` on, which is turned off
    /// again afterwards. Tables referencing this one keep pointing at it only
    /// if foreign key enforcement is off as well; [`Schemas::upgrade`] takes
    /// care of that.
    ///
    /// The statements are not atomic on their own; callers wrap the rebuild
    /// in a transaction when they need that. Concurrent writers to the table
    /// are not supported.
    ///
    /// [`Schemas::upgrade`]: crate::registry::Schemas::upgrade
    pub async fn run(
        &self,
        db: &mut dyn Database,
        names: &TempTableNames,
    ) -> Result<RebuildReport> {
        debug!(table = %self.table, "Rebuilding table");

        db.execute(&statement::legacy_alter_table(true)).await?;
        let result = self.copy_into_new_shape(&mut *db, names).await;
        let restored = db.execute(&statement::legacy_alter_table(false)).await;

        let report = result?;
        restored?;
        Ok(report)
    }

    async fn copy_into_new_shape(
        &self,
        db: &mut dyn Database,
        names: &TempTableNames,
    ) -> Result<RebuildReport> {
        let table = self.table.as_str();

        let old_table = names.next_for(table);
        db.execute(&statement::rename_table(table, &old_table)).await?;
        let old_columns = db.list_columns(&old_table).await?;

        // The new table is read under a scratch name so the old copy keeps
        // its own columns while the original name is taken.
        db.execute(&self.create_statement).await?;
        let new_table = names.next_for(table);
        db.execute(&statement::rename_table(table, &new_table)).await?;
        let new_columns = db.list_columns(&new_table).await?;
        db.execute(&statement::rename_table(&new_table, table)).await?;

        let report = self.plan(&old_columns, &new_columns);

        if !report.dropped.is_empty() {
            warn!(
                table = %table,
                columns = ?report.dropped,
                "Dropping columns during table rebuild"
            );
        }
        if !report.defaulted.is_empty() {
            warn!(
                table = %table,
                columns = ?report.defaulted,
                "New columns without mapping will hold their default value"
            );
        }

        let unmapped: Vec<&str> = old_columns
            .intersection(&new_columns)
            .filter(|column| !self.mappings.contains_key(*column))
            .map(String::as_str)
            .collect();

        let mut columns = unmapped.clone();
        columns.extend(self.mappings.keys().map(String::as_str));
        let mut expressions = unmapped;
        expressions.extend(self.mappings.values().map(String::as_str));

        if columns.is_empty() {
            debug!(table = %table, "Nothing to copy");
        } else {
            db.execute(&statement::insert_select(
                table,
                &columns,
                &expressions,
                &old_table,
            ))
            .await?;
        }

        db.execute(&statement::drop_table(&old_table)).await?;
        Ok(report)
    }

    fn plan(
        &self,
        old_columns: &BTreeSet<String>,
        new_columns: &BTreeSet<String>,
    ) -> RebuildReport {
        let mut copied: BTreeSet<String> = old_columns
            .intersection(new_columns)
            .cloned()
            .collect();
        copied.extend(self.mappings.keys().cloned());

        RebuildReport {
            copied,
            dropped: old_columns.difference(new_columns).cloned().collect(),
            defaulted: new_columns
                .difference(old_columns)
                .filter(|column| !self.mappings.contains_key(*column))
                .cloned()
                .collect(),
        }
    }
}
