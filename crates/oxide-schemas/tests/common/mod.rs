#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};

use oxide_schemas::prelude::*;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// A call made against a [`RecordingDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(String),
    ListColumns(String),
}

/// A database double that records every call and answers column listings
/// from a queue.
///
/// Foreign key enforcement follows the `PRAGMA foreign_keys` statements it
/// executes, as on a connection outside a transaction.
#[derive(Debug, Default)]
pub struct RecordingDatabase {
    pub calls: Vec<Call>,
    pub foreign_keys: bool,
    columns: VecDeque<BTreeSet<String>>,
    violations: Vec<ForeignKeyViolation>,
}

impl RecordingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer of the next `list_columns` call.
    pub fn answer_columns(mut self, columns: &[&str]) -> Self {
        self.columns.push_back(set(columns));
        self
    }

    /// Starts with foreign key enforcement on.
    pub fn enforcing_foreign_keys(mut self) -> Self {
        self.foreign_keys = true;
        self
    }

    /// Reports a row of `table` referencing a missing row of `parent`.
    pub fn with_violation(mut self, table: &str, parent: &str) -> Self {
        self.violations.push(ForeignKeyViolation {
            table: table.to_string(),
            rowid: Some(1),
            parent: parent.to_string(),
        });
        self
    }

    /// Returns the executed statements, without column listings.
    pub fn statements(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Execute(sql) => Some(sql.as_str()),
                Call::ListColumns(_) => None,
            })
            .collect()
    }
}

impl Database for RecordingDatabase {
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match sql {
                "PRAGMA foreign_keys = ON" => self.foreign_keys = true,
                "PRAGMA foreign_keys = OFF" => self.foreign_keys = false,
                _ => {}
            }
            self.calls.push(Call::Execute(sql.to_string()));
            Ok(())
        })
    }

    fn list_columns<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<BTreeSet<String>>> {
        Box::pin(async move {
            self.calls.push(Call::ListColumns(table.to_string()));
            Ok(self.columns.pop_front().unwrap_or_default())
        })
    }

    fn foreign_keys_enabled<'a>(&'a mut self) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.foreign_keys) })
    }

    fn foreign_key_violations<'a>(&'a mut self) -> BoxFuture<'a, Result<Vec<ForeignKeyViolation>>> {
        Box::pin(async move { Ok(self.violations.clone()) })
    }
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

pub fn column(name: &str) -> TableOperation {
    TableOperation::add_column(name, "")
}

pub fn table(name: &str, operations: Vec<TableOperation>) -> TableDefinition {
    TableDefinition::new(name, operations)
        .unwrap_or_else(|e| panic!("Invalid table definition {name}: {e}"))
}

pub fn downgrade(name: &str, operations: Vec<TableOperation>) -> TableDowngrade {
    TableDowngrade::new(name, operations)
        .unwrap_or_else(|e| panic!("Invalid table downgrade {name}: {e}"))
}

pub async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Live column names of a table.
pub async fn live_columns(pool: &SqlitePool, table: &str) -> BTreeSet<String> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(pool)
        .await
        .expect("Failed to list columns");
    rows.into_iter().map(|(name,)| name).collect()
}

/// Live table names, excluding SQLite internals.
pub async fn live_tables(pool: &SqlitePool) -> BTreeSet<String> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to list tables");
    rows.into_iter().map(|(name,)| name).collect()
}

/// Contacts gained `created_at` at revision 2 and `updated_at` at revision
/// 3; the upgrade to 4 fills both from the current time.
pub fn contacts_schemas() -> Schemas {
    Schemas::builder(
        4,
        vec![table(
            "contacts",
            vec![
                TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
                TableOperation::add_column("created_at", "INTEGER"),
                TableOperation::add_column("updated_at", "INTEGER"),
            ],
        )],
    )
    .and_then(|b| {
        b.upgrade_to(
            4,
            vec![SimpleTableMigration::of("contacts")
                .with_mapping("created_at", "STRFTIME('%s', 'now')")
                .with_mapping("updated_at", "STRFTIME('%s', 'now')")
                .boxed()],
        )
    })
    .and_then(|b| {
        b.downgrade_to(
            2,
            vec![downgrade("contacts", vec![TableOperation::drop_column("updated_at")])],
        )
    })
    .and_then(|b| {
        b.downgrade_to(
            1,
            vec![downgrade("contacts", vec![TableOperation::drop_column("created_at")])],
        )
    })
    .and_then(SchemasBuilder::build)
    .expect("Invalid contacts schemas")
}
