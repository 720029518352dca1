//! Opening a database at a schema version.
//!
//! [`open_database`] brings the database behind a pool to the requested
//! revision: an empty database gets every table created directly, an older
//! one is upgraded one revision at a time.

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Connection;
use tracing::{debug, info};

use crate::database::{check_foreign_keys, suspend_foreign_keys, Database};
use crate::error::{Result, SchemaError};
use crate::migrations::MigrationContext;
use crate::registry::Schemas;
use crate::statement;
use crate::version::SchemaVersion;

/// What [`open_database`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The database was empty and has been created at the version.
    Created {
        /// Version created.
        version: i32,
    },
    /// The database has been upgraded.
    Upgraded {
        /// Version found in the database.
        from: i32,
        /// Version reached.
        to: i32,
    },
    /// The database was already at the version.
    Current {
        /// Version found in the database.
        version: i32,
    },
}

/// Opens the database behind `pool` at `version`.
///
/// Creation runs in a single transaction. Upgrades commit each revision
/// together with its stored version, so a failed upgrade leaves the database
/// at the last revision that fully applied, and reopening resumes from there.
/// A revision leaving rows that reference missing parents is rolled back.
///
/// Foreign key enforcement is off while upgrading and restored afterwards.
pub async fn open_database(
    pool: &SqlitePool,
    schemas: &Schemas,
    version: i32,
) -> Result<OpenOutcome> {
    let mut conn = pool.acquire().await?;
    let stored = SchemaVersion::read(&mut conn).await?;
    debug!(stored, requested = version, "Opening database");

    if stored > version {
        return Err(SchemaError::Downgrade {
            stored,
            requested: version,
        });
    }

    if stored == version {
        return Ok(OpenOutcome::Current { version });
    }

    if version > schemas.current_revision() {
        return Err(SchemaError::RevisionAboveCurrent {
            requested: version,
            current: schemas.current_revision(),
        });
    }

    if stored == 0 {
        let mut tx = conn.begin().await?;
        schemas.create_all(version, &mut *tx).await?;
        SchemaVersion::write(&mut tx, version).await?;
        tx.commit().await?;

        info!(version, "Database created");
        return Ok(OpenOutcome::Created { version });
    }

    let enforced = suspend_foreign_keys(&mut *conn).await?;
    let result = upgrade(&mut conn, schemas, stored, version).await;
    if enforced {
        Database::execute(&mut *conn, &statement::foreign_keys(true)).await?;
    }
    result?;

    info!(from = stored, to = version, "Database upgraded");
    Ok(OpenOutcome::Upgraded {
        from: stored,
        to: version,
    })
}

async fn upgrade(
    conn: &mut SqliteConnection,
    schemas: &Schemas,
    stored: i32,
    version: i32,
) -> Result<()> {
    let ctx = MigrationContext::new(schemas);
    for step in (stored + 1)..=version {
        let mut tx = conn.begin().await?;
        schemas.migrate_to(step, &mut *tx, &ctx).await?;
        check_foreign_keys(&mut *tx).await?;
        SchemaVersion::write(&mut tx, step).await?;
        tx.commit().await?;
    }
    Ok(())
}
