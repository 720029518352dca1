//! The schema registry and upgrade orchestration.
//!
//! [`Schemas`] owns the declared current schema, the downgrade chain and the
//! explicit upgrades. Historical revisions are reconstructed lazily and
//! cached for the registry's lifetime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::builder::{Release, ReleaseMarker, SchemasBuilder};
use crate::database::{check_foreign_keys, suspend_foreign_keys, Database};
use crate::error::{Result, SchemaError};
use crate::merge::{merge, DowngradeMap};
use crate::migrations::{auto, Migration, MigrationContext};
use crate::schema::{Revision, TableDefinition, TableMap};
use crate::state::RevisionCache;
use crate::statement;

/// Every revision of a declared schema.
///
/// `Schemas` is immutable once built and can be shared across threads;
/// concurrent lookups of the same revision reconstruct it once.
pub struct Schemas {
    current_revision: i32,
    downgrades: BTreeMap<i32, DowngradeMap>,
    upgrades: BTreeMap<i32, Vec<Box<dyn Migration>>>,
    automatic: Vec<Box<dyn Migration>>,
    releases: Vec<ReleaseMarker>,
    cache: RevisionCache,
}

impl fmt::Debug for Schemas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schemas")
            .field("current_revision", &self.current_revision)
            .field("downgrades", &self.downgrades.keys().collect::<Vec<_>>())
            .field("upgrades", &self.upgrades.keys().collect::<Vec<_>>())
            .field("releases", &self.releases)
            .finish_non_exhaustive()
    }
}

impl Schemas {
    /// Starts a declaration. See [`SchemasBuilder::current_schema`].
    pub fn builder(offset: i32, tables: Vec<TableDefinition>) -> Result<SchemasBuilder> {
        SchemasBuilder::current_schema(offset, tables)
    }

    pub(crate) fn new(
        current_revision: i32,
        tables: TableMap,
        downgrades: BTreeMap<i32, DowngradeMap>,
        upgrades: BTreeMap<i32, Vec<Box<dyn Migration>>>,
        releases: Vec<ReleaseMarker>,
    ) -> Self {
        Self {
            current_revision,
            downgrades,
            upgrades,
            automatic: vec![auto()],
            releases,
            cache: RevisionCache::new(Revision::new(current_revision, Arc::new(tables))),
        }
    }

    /// Returns the newest revision number.
    #[must_use]
    pub const fn current_revision(&self) -> i32 {
        self.current_revision
    }

    /// Returns the schema at the newest revision.
    pub fn current_schema(&self) -> Result<Arc<Revision>> {
        self.schema_at(self.current_revision)
    }

    /// Returns the schema at `version`.
    ///
    /// Versions above the current revision are an error.
    pub fn schema_at(&self, version: i32) -> Result<Arc<Revision>> {
        self.cache.get_or_walk(version, |revision, newer| {
            match self.downgrades.get(&revision) {
                Some(downgrade) => merge(newer, downgrade, revision, |r| {
                    self.describe_revision(r)
                })
                .map(Arc::new),
                None => Ok(Arc::clone(newer)),
            }
        })
    }

    /// Returns the tables that differ between `version - 1` and `version`.
    #[must_use]
    pub fn tables_changed_at(&self, version: i32) -> BTreeSet<String> {
        version
            .checked_sub(1)
            .and_then(|previous| self.downgrades.get(&previous))
            .map(|downgrade| downgrade.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the migrations run when upgrading to `version`: the declared
    /// upgrade list, or the automatic migration alone.
    #[must_use]
    pub fn migrations_for(&self, version: i32) -> &[Box<dyn Migration>] {
        self.upgrades
            .get(&version)
            .map_or(self.automatic.as_slice(), Vec::as_slice)
    }

    /// Upgrades a database from `from` to the current revision.
    pub async fn upgrade(&self, from: i32, db: &mut dyn Database) -> Result<()> {
        self.upgrade_between(from, self.current_revision, db).await
    }

    /// Upgrades a database from `from` to `to`, one revision at a time.
    ///
    /// Foreign key enforcement is turned off for the run, so that table
    /// rebuilds neither cascade into nor re-point referencing tables, and
    /// restored afterwards. `db` must therefore not be inside a transaction
    /// while enforcement is on. Once every revision is migrated, any row left
    /// referencing a missing parent fails the upgrade.
    ///
    /// The first failing migration aborts the run; revisions migrated before
    /// it stay applied.
    pub async fn upgrade_between(&self, from: i32, to: i32, db: &mut dyn Database) -> Result<()> {
        if to > self.current_revision {
            return Err(SchemaError::RevisionAboveCurrent {
                requested: to,
                current: self.current_revision,
            });
        }
        if from >= to {
            return Ok(());
        }

        info!(from, to, "Upgrading database schema");
        let enforced = suspend_foreign_keys(&mut *db).await?;

        let result = match self.migrate_range(from, to, &mut *db).await {
            Ok(()) => check_foreign_keys(&mut *db).await,
            Err(e) => Err(e),
        };

        if enforced {
            db.execute(&statement::foreign_keys(true)).await?;
        }
        result
    }

    async fn migrate_range(&self, from: i32, to: i32, db: &mut dyn Database) -> Result<()> {
        let ctx = MigrationContext::new(self);
        for version in (from + 1)..=to {
            self.migrate_to(version, &mut *db, &ctx).await?;
        }
        Ok(())
    }

    /// Runs the migrations of a single revision.
    pub async fn migrate_to(
        &self,
        version: i32,
        db: &mut dyn Database,
        ctx: &MigrationContext<'_>,
    ) -> Result<()> {
        info!(version, "Migrating to schema version");
        for migration in self.migrations_for(version) {
            migration.apply(version, &mut *db, ctx).await?;
        }
        Ok(())
    }

    /// Creates every table of `version` in an empty database.
    pub async fn create_all(&self, version: i32, db: &mut dyn Database) -> Result<()> {
        let schema = self.schema_at(version)?;
        info!(version, tables = schema.tables().len(), "Creating database schema");

        for table in schema.tables() {
            db.execute(&schema.create_table_statement(&table)?).await?;
        }
        Ok(())
    }

    /// Renders a revision for error messages, relative to the release it
    /// was declared above.
    fn describe_revision(&self, revision: i32) -> String {
        match self
            .releases
            .iter()
            .find(|release| release.schema_version() <= revision)
        {
            Some(release) => format!(
                "revision {revision} (downgradeTo({}, ...) above {release})",
                i64::from(revision) - i64::from(release.schema_version())
            ),
            None => format!("revision {revision}"),
        }
    }
}
