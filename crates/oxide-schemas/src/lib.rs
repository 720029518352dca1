//! Versioned SQLite schemas reconstructed from downgrade chains.
//!
//! `oxide-schemas` lets an application declare only its *current* schema plus
//! a chain of downgrades describing how each older revision differed from
//! the next newer one. Every historical schema is derived on demand, and a
//! live database is carried from any older revision to the current one:
//!
//! - Tables added or removed at a revision are created or dropped
//! - Tables altered at a revision are rebuilt by copying their rows into the
//!   new shape, since SQLite cannot redefine columns in place
//! - Explicit upgrades replace the automatic behavior where data needs to be
//!   transformed
//!
//! # Architecture
//!
//! - **Operations** - `AddColumn`, `DropColumn`, `AddConstraint`,
//!   `DropConstraint` and `DropTable`
//! - **Builder** - Validates the declaration and resolves release-relative
//!   offsets into revisions
//! - **Registry** - Reconstructs and caches old revisions, runs upgrades
//! - **Rebuild** - Copy-based table rebuilds
//! - **Lifecycle** - Creates or upgrades a database, tracking its version in
//!   `PRAGMA user_version`
//!
//! # Example
//!
//! ```rust,no_run
//! use oxide_schemas::prelude::*;
//!
//! # async fn run(pool: sqlx::SqlitePool) -> Result<()> {
//! let schemas = Schemas::builder(
//!     4,
//!     vec![TableDefinition::new(
//!         "contacts",
//!         vec![
//!             TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
//!             TableOperation::add_column("created_at", "INTEGER"),
//!             TableOperation::add_column("updated_at", "INTEGER"),
//!         ],
//!     )?],
//! )?
//! .upgrade_to(
//!     4,
//!     vec![SimpleTableMigration::of("contacts")
//!         .with_mapping("updated_at", "created_at")
//!         .boxed()],
//! )?
//! .downgrade_to(
//!     2,
//!     vec![TableDowngrade::new("contacts", vec![TableOperation::drop_column("updated_at")])?],
//! )?
//! .downgrade_to(
//!     1,
//!     vec![TableDowngrade::new("contacts", vec![TableOperation::drop_column("created_at")])?],
//! )?
//! .build()?;
//!
//! open_database(&pool, &schemas, schemas.current_revision()).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod database;
pub mod error;
pub mod lifecycle;
pub mod merge;
pub mod migrations;
pub mod operations;
pub mod rebuild;
pub mod registry;
pub mod schema;
mod state;
pub mod statement;
pub mod version;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builder::{Release, ReleaseMarker, SchemasBuilder};
    pub use crate::database::{BoxFuture, Database, ForeignKeyViolation};
    pub use crate::error::{Result, SchemaError};
    pub use crate::lifecycle::{open_database, OpenOutcome};
    pub use crate::migrations::{Migration, MigrationContext, SimpleTableMigration};
    pub use crate::operations::{OperationId, OperationScope, TableOperation};
    pub use crate::rebuild::{RebuildReport, TableRebuild, TempTableNames};
    pub use crate::registry::Schemas;
    pub use crate::schema::{drop_table, Revision, TableDefinition, TableDowngrade};
    pub use crate::version::SchemaVersion;
}
