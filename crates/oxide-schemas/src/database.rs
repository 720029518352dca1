//! Storage handle used by migrations.
//!
//! Migrations only ever need to run a statement and read the columns of a
//! table; upgrades additionally toggle and check foreign keys. [`Database`]
//! captures exactly that, and is implemented for `sqlx::SqliteConnection`
//! (and therefore for an open transaction, which dereferences to one).

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::statement;

/// A boxed future for async database operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A row referencing a missing parent row, as reported by
/// `PRAGMA foreign_key_check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyViolation {
    /// Child table.
    pub table: String,
    /// Rowid of the offending row, absent for `WITHOUT ROWID` tables.
    pub rowid: Option<i64>,
    /// Referenced table.
    pub parent: String,
}

/// A live database handle.
///
/// # Example
///
/// ```ignore
/// struct Recorder(Vec<String>);
///
/// impl Database for Recorder {
///     fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move {
///             self.0.push(sql.to_string());
///             Ok(())
///         })
///     }
///
///     fn list_columns<'a>(&'a mut self, _table: &'a str) -> BoxFuture<'a, Result<BTreeSet<String>>> {
///         Box::pin(async move { Ok(BTreeSet::new()) })
///     }
///
///     fn foreign_keys_enabled<'a>(&'a mut self) -> BoxFuture<'a, Result<bool>> {
///         Box::pin(async move { Ok(false) })
///     }
///
///     fn foreign_key_violations<'a>(&'a mut self) -> BoxFuture<'a, Result<Vec<ForeignKeyViolation>>> {
///         Box::pin(async move { Ok(Vec::new()) })
///     }
/// }
/// ```
pub trait Database: Send {
    /// Runs a single statement that returns no rows.
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Returns the names of the columns a table currently has.
    fn list_columns<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<BTreeSet<String>>>;

    /// Returns whether foreign key constraints are enforced.
    fn foreign_keys_enabled<'a>(&'a mut self) -> BoxFuture<'a, Result<bool>>;

    /// Returns every row referencing a missing parent row.
    fn foreign_key_violations<'a>(&'a mut self) -> BoxFuture<'a, Result<Vec<ForeignKeyViolation>>>;
}

impl Database for SqliteConnection {
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(sql).execute(&mut *self).await?;
            Ok(())
        })
    }

    fn list_columns<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<BTreeSet<String>>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
                .bind(table)
                .fetch_all(&mut *self)
                .await?;
            Ok(rows.into_iter().map(|(name,)| name).collect())
        })
    }

    fn foreign_keys_enabled<'a>(&'a mut self) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
                .fetch_one(&mut *self)
                .await?;
            Ok(row.0 != 0)
        })
    }

    fn foreign_key_violations<'a>(&'a mut self) -> BoxFuture<'a, Result<Vec<ForeignKeyViolation>>> {
        Box::pin(async move {
            let rows: Vec<(String, Option<i64>, String, i64)> =
                sqlx::query_as("PRAGMA foreign_key_check")
                    .fetch_all(&mut *self)
                    .await?;
            Ok(rows
                .into_iter()
                .map(|(table, rowid, parent, _)| ForeignKeyViolation {
                    table,
                    rowid,
                    parent,
                })
                .collect())
        })
    }
}

/// Turns foreign key enforcement off for the rest of the connection's
/// session. Returns whether it was on, so the caller can restore it.
///
/// Enforcement cannot change inside a transaction, so a handle that is one
/// with enforcement on is rejected.
pub(crate) async fn suspend_foreign_keys(db: &mut dyn Database) -> Result<bool> {
    if !db.foreign_keys_enabled().await? {
        return Ok(false);
    }

    db.execute(&statement::foreign_keys(false)).await?;
    if db.foreign_keys_enabled().await? {
        return Err(SchemaError::ForeignKeysEnforced);
    }
    Ok(true)
}

/// Fails when any row references a missing parent row.
pub(crate) async fn check_foreign_keys(db: &mut dyn Database) -> Result<()> {
    let violations = db.foreign_key_violations().await?;
    match violations.first() {
        None => Ok(()),
        Some(first) => {
            warn!(
                count = violations.len(),
                table = %first.table,
                parent = %first.parent,
                "Foreign key violations after upgrade"
            );
            Err(SchemaError::ForeignKeyViolation {
                table: first.table.clone(),
                parent: first.parent.clone(),
                count: violations.len(),
            })
        }
    }
}
