//! Migrations run while upgrading a live database.
//!
//! Every revision without an explicit `upgrade_to` is migrated by [`auto()`],
//! which diffs the reconstructed schemas on both sides of the revision.
//! Explicit upgrade lists combine the primitives of this module with custom
//! [`Migration`] implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::database::{BoxFuture, Database};
use crate::error::Result;
use crate::rebuild::{TableRebuild, TempTableNames};
use crate::registry::Schemas;
use crate::statement;

/// State shared by every migration of one upgrade run.
#[derive(Debug)]
pub struct MigrationContext<'a> {
    schemas: &'a Schemas,
    temp_names: TempTableNames,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context with a fresh temporary name counter.
    #[must_use]
    pub const fn new(schemas: &'a Schemas) -> Self {
        Self {
            schemas,
            temp_names: TempTableNames::new(),
        }
    }

    /// Returns the registry being migrated to.
    #[must_use]
    pub const fn schemas(&self) -> &'a Schemas {
        self.schemas
    }

    /// Returns the temporary table names of this run.
    #[must_use]
    pub const fn temp_names(&self) -> &TempTableNames {
        &self.temp_names
    }
}

/// A step run when upgrading a database to a revision.
///
/// # Example
///
/// ```rust
/// use oxide_schemas::prelude::*;
///
/// struct Seed;
///
/// impl Migration for Seed {
///     fn apply<'a>(
///         &'a self,
///         _version: i32,
///         db: &'a mut dyn Database,
///         _ctx: &'a MigrationContext<'a>,
///     ) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move { db.execute("INSERT INTO contacts(id) VALUES (1)").await })
///     }
/// }
/// ```
pub trait Migration: Send + Sync {
    /// Applies the migration for the upgrade to `version`.
    fn apply<'a>(
        &'a self,
        version: i32,
        db: &'a mut dyn Database,
        ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Returns true only for the automatic migration.
    fn is_automatic(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_automatic() {
            f.write_str("Migration(auto)")
        } else {
            f.write_str("Migration")
        }
    }
}

struct AutoMigration;

impl Migration for AutoMigration {
    fn apply<'a>(
        &'a self,
        version: i32,
        db: &'a mut dyn Database,
        ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let schemas = ctx.schemas();
            let changed = schemas.tables_changed_at(version);
            if changed.is_empty() {
                return Ok(());
            }

            let new_schema = schemas.schema_at(version)?;
            let old_schema = schemas.schema_at(version - 1)?;
            let new_tables = new_schema.tables();
            let old_tables = old_schema.tables();

            for table in new_tables.difference(&old_tables) {
                db.execute(&new_schema.create_table_statement(table)?)
                    .await?;
            }

            for table in old_tables.difference(&new_tables) {
                db.execute(&statement::drop_table_if_exists(table)).await?;
            }

            for table in old_tables.intersection(&new_tables) {
                if changed.contains(table) {
                    TableRebuild::new(table.as_str(), new_schema.create_table_statement(table)?)
                        .run(db, ctx.temp_names())
                        .await?;
                }
            }

            Ok(())
        })
    }

    fn is_automatic(&self) -> bool {
        true
    }
}

/// The automatic migration.
///
/// Creates tables added at the revision, drops removed ones and rebuilds
/// every other table the revision changed. It is implied for revisions
/// without an explicit upgrade; list it explicitly to combine it with other
/// migrations.
#[must_use]
pub fn auto() -> Box<dyn Migration> {
    Box::new(AutoMigration)
}

struct DropTables {
    tables: Vec<String>,
}

impl Migration for DropTables {
    fn apply<'a>(
        &'a self,
        _version: i32,
        db: &'a mut dyn Database,
        _ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for table in &self.tables {
                db.execute(&statement::drop_table_if_exists(table)).await?;
            }
            Ok(())
        })
    }
}

/// Drops tables if they exist.
#[must_use]
pub fn drop<I, S>(tables: I) -> Box<dyn Migration>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Box::new(DropTables {
        tables: tables.into_iter().map(Into::into).collect(),
    })
}

struct CreateTables {
    tables: Vec<String>,
}

impl Migration for CreateTables {
    fn apply<'a>(
        &'a self,
        version: i32,
        db: &'a mut dyn Database,
        ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let schema = ctx.schemas().schema_at(version)?;
            for table in &self.tables {
                db.execute(&schema.create_table_statement(table)?).await?;
            }
            Ok(())
        })
    }
}

/// Creates tables in their shape at the migrated-to revision.
#[must_use]
pub fn create<I, S>(tables: I) -> Box<dyn Migration>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Box::new(CreateTables {
        tables: tables.into_iter().map(Into::into).collect(),
    })
}

struct RecreateTables {
    drop: DropTables,
    create: CreateTables,
}

impl Migration for RecreateTables {
    fn apply<'a>(
        &'a self,
        version: i32,
        db: &'a mut dyn Database,
        ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.drop.apply(version, &mut *db, ctx).await?;
            self.create.apply(version, db, ctx).await
        })
    }
}

/// Drops and then creates tables, discarding their data.
#[must_use]
pub fn recreate<I, S>(tables: I) -> Box<dyn Migration>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
    Box::new(RecreateTables {
        drop: DropTables {
            tables: tables.clone(),
        },
        create: CreateTables { tables },
    })
}

/// Rebuilds one table into its shape at the migrated-to revision, filling
/// columns from explicit expressions over the old table.
///
/// # Example
///
/// ```rust
/// use oxide_schemas::prelude::*;
///
/// let migration = SimpleTableMigration::of("contacts")
///     .with_mapping("created_at", "STRFTIME('%s', 'now')")
///     .with_mapping("updated_at", "STRFTIME('%s', 'now')");
///
/// assert_eq!(migration.table(), "contacts");
/// let _boxed: Box<dyn Migration> = migration.boxed();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTableMigration {
    table: String,
    mappings: BTreeMap<String, String>,
}

impl SimpleTableMigration {
    /// Starts a migration of `table` without mappings.
    pub fn of(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Fills `new_column` from `expression`, evaluated against the old table.
    #[must_use]
    pub fn with_mapping(
        mut self,
        new_column: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.mappings.insert(new_column.into(), expression.into());
        self
    }

    /// Returns the migrated table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the explicitly mapped columns.
    #[must_use]
    pub fn mapped_columns(&self) -> BTreeSet<&str> {
        self.mappings.keys().map(String::as_str).collect()
    }

    /// Boxes the migration for an upgrade list.
    #[must_use]
    pub fn boxed(self) -> Box<dyn Migration> {
        Box::new(self)
    }
}

impl Migration for SimpleTableMigration {
    fn apply<'a>(
        &'a self,
        version: i32,
        db: &'a mut dyn Database,
        ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let schema = ctx.schemas().schema_at(version)?;
            debug!(table = %self.table, version, "Migrating table with mappings");

            TableRebuild::new(self.table.as_str(), schema.create_table_statement(&self.table)?)
                .with_mappings(
                    self.mappings
                        .iter()
                        .map(|(column, expression)| (column.as_str(), expression.as_str())),
                )
                .run(db, ctx.temp_names())
                .await?;
            Ok(())
        })
    }
}
