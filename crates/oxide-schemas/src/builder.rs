//! Fluent schema declaration.
//!
//! A declaration starts with the current schema and walks back in time:
//! downgrades and upgrades are declared with descending offsets relative to
//! the next release marker below them, and each [`Release`] turns the offsets
//! declared above it into absolute revisions. [`SchemasBuilder::build`]
//! closes the last section against the initial, version 0 schema.
//!
//! ```rust
//! use oxide_schemas::prelude::*;
//!
//! let schemas = SchemasBuilder::current_schema(
//!     2,
//!     vec![TableDefinition::new(
//!         "contacts",
//!         vec![
//!             TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
//!             TableOperation::add_column("email", "TEXT"),
//!         ],
//!     )
//!     .unwrap()],
//! )
//! .unwrap()
//! .downgrade_to(
//!     1,
//!     vec![TableDowngrade::new("contacts", vec![TableOperation::drop_column("email")]).unwrap()],
//! )
//! .unwrap()
//! .release(ReleaseMarker::new("1.0", 10))
//! .unwrap()
//! .build()
//! .unwrap();
//!
//! assert_eq!(schemas.current_revision(), 12);
//! assert_eq!(schemas.schema_at(11).unwrap().columns("contacts").unwrap().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, SchemaError};
use crate::merge::DowngradeMap;
use crate::migrations::Migration;
use crate::registry::Schemas;
use crate::schema::{TableDefinition, TableDowngrade, TableMap};

/// An anchor associating a schema version with a point of the declaration.
pub trait Release: fmt::Display {
    /// Returns the schema version shipped with this release.
    fn schema_version(&self) -> i32;
}

/// A named release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseMarker {
    name: String,
    version: i32,
}

impl ReleaseMarker {
    /// Creates a release marker.
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub(crate) fn of(release: &dyn Release) -> Self {
        Self::new(release.to_string(), release.schema_version())
    }

    pub(crate) fn initial() -> Self {
        Self::new("INITIAL DB SCHEMA", 0)
    }

    /// Returns the release name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ReleaseMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Release for ReleaseMarker {
    fn schema_version(&self) -> i32 {
        self.version
    }
}

/// Position of the last downgrade or upgrade within the open section.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: i32,
    upgrade_declared: bool,
}

/// Accumulates a schema declaration and validates it as it goes.
///
/// Every method fails fast with a [`SchemaError`] for which
/// [`SchemaError::is_declaration`] holds.
pub struct SchemasBuilder {
    current_offset: i32,
    tables: TableMap,
    downgrades: BTreeMap<i32, DowngradeMap>,
    upgrades: BTreeMap<i32, Vec<Box<dyn Migration>>>,
    releases: Vec<ReleaseMarker>,
    current_release: Option<i32>,
    last_release: Option<ReleaseMarker>,
    cursor: Option<Cursor>,
    pending_downgrades: BTreeMap<i32, DowngradeMap>,
    pending_upgrades: BTreeMap<i32, Vec<Box<dyn Migration>>>,
}

impl fmt::Debug for SchemasBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemasBuilder")
            .field("current_offset", &self.current_offset)
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("releases", &self.releases)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl SchemasBuilder {
    /// Starts a declaration with the current schema at `offset` above the
    /// newest release.
    pub fn current_schema(offset: i32, tables: Vec<TableDefinition>) -> Result<Self> {
        let mut map = TableMap::new();
        for table in tables {
            let (name, operations) = table.into_parts();
            if map.contains_key(&name) {
                return Err(SchemaError::DuplicateTable {
                    table: name,
                    scope: "current schema".to_string(),
                });
            }
            map.insert(name, operations);
        }

        Ok(Self {
            current_offset: offset,
            tables: map,
            downgrades: BTreeMap::new(),
            upgrades: BTreeMap::new(),
            releases: Vec::new(),
            current_release: None,
            last_release: None,
            cursor: Some(Cursor {
                offset,
                upgrade_declared: false,
            }),
            pending_downgrades: BTreeMap::new(),
            pending_upgrades: BTreeMap::new(),
        })
    }

    /// Declares how tables looked at `offset`, relative to the next release.
    ///
    /// Applying the downgrade to the schema at `offset + 1` yields the
    /// schema at `offset`.
    pub fn downgrade_to(mut self, offset: i32, tables: Vec<TableDowngrade>) -> Result<Self> {
        if offset < 0 {
            return Err(SchemaError::NegativeDowngradeOffset { offset });
        }

        if let Some(cursor) = self.cursor {
            if offset >= cursor.offset {
                return Err(SchemaError::NonDescendingOffset {
                    reason: format!(
                        "The downgrade offset ({offset}) should be lower than current offset ({})",
                        cursor.offset
                    ),
                });
            }
        }

        let mut downgrade = DowngradeMap::new();
        for table in tables {
            let (name, operations) = table.into_parts();
            if downgrade.contains_key(&name) {
                return Err(SchemaError::DuplicateTable {
                    table: name,
                    scope: format!("downgrade to {offset}"),
                });
            }
            downgrade.insert(name, operations);
        }

        self.pending_downgrades.insert(offset, downgrade);
        self.cursor = Some(Cursor {
            offset,
            upgrade_declared: false,
        });
        Ok(self)
    }

    /// Declares the migrations run when upgrading to `offset`, replacing the
    /// automatic migration for that revision.
    pub fn upgrade_to(mut self, offset: i32, migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        if offset <= 0 {
            return Err(SchemaError::NonPositiveUpgradeOffset { offset });
        }

        match migrations.as_slice() {
            [] => return Err(SchemaError::EmptyUpgrade { offset }),
            [only] if only.is_automatic() => {
                return Err(SchemaError::LoneAutoMigration { offset });
            }
            all if all.iter().filter(|m| m.is_automatic()).count() > 1 => {
                return Err(SchemaError::MultipleAutoMigrations { offset });
            }
            _ => {}
        }

        if let Some(cursor) = self.cursor {
            if cursor.upgrade_declared && offset >= cursor.offset {
                return Err(SchemaError::NonDescendingOffset {
                    reason: format!(
                        "The upgrade to {current} is already defined, so upgrade offset {offset} should be lower than {current}",
                        current = cursor.offset
                    ),
                });
            }
            if offset > cursor.offset {
                return Err(SchemaError::NonDescendingOffset {
                    reason: format!(
                        "The upgrade offset {offset} should be lower or equal to {}",
                        cursor.offset
                    ),
                });
            }
        }

        self.pending_upgrades.insert(offset, migrations);
        self.cursor = Some(Cursor {
            offset,
            upgrade_declared: true,
        });
        Ok(self)
    }

    /// Marks a release. Offsets declared since the previous release become
    /// revisions relative to this one's schema version.
    pub fn release(mut self, release: impl Release) -> Result<Self> {
        let release = ReleaseMarker::of(&release);

        if let Some(last) = &self.last_release {
            if release.version > last.version {
                return Err(SchemaError::AscendingRelease {
                    previous: last.version,
                    version: release.version,
                });
            }
        }

        if self.current_release.is_none() {
            self.current_release = Some(release.version);
        }
        self.flush(&release)?;

        self.cursor = None;
        self.last_release = Some(release);
        Ok(self)
    }

    /// Closes the declaration and builds the registry.
    pub fn build(mut self) -> Result<Schemas> {
        self.flush(&ReleaseMarker::initial())?;

        let current_revision = match self.current_release {
            Some(version) => resolve(self.current_offset, version)?,
            None => self.current_offset,
        };

        Ok(Schemas::new(
            current_revision,
            self.tables,
            self.downgrades,
            self.upgrades,
            self.releases,
        ))
    }

    fn flush(&mut self, release: &ReleaseMarker) -> Result<()> {
        self.releases.push(release.clone());
        let base = release.version;

        for (offset, downgrade) in std::mem::take(&mut self.pending_downgrades) {
            let revision = resolve(offset, base)?;
            if let Some(last) = &self.last_release {
                if revision >= last.version {
                    return Err(out_of_range("downgrade", offset, release, last, |span| {
                        format!("[0, {span})")
                    }));
                }
            }
            self.downgrades.insert(revision, downgrade);
        }

        for (offset, migrations) in std::mem::take(&mut self.pending_upgrades) {
            let revision = resolve(offset, base)?;
            if let Some(last) = &self.last_release {
                if revision > last.version {
                    return Err(out_of_range("upgrade", offset, release, last, |span| {
                        format!("(0, {span}]")
                    }));
                }
            }
            self.upgrades.insert(revision, migrations);
        }

        Ok(())
    }
}

fn resolve(offset: i32, base: i32) -> Result<i32> {
    offset
        .checked_add(base)
        .ok_or(SchemaError::RevisionOverflow { offset, base })
}

fn out_of_range<F>(
    kind: &'static str,
    offset: i32,
    release: &ReleaseMarker,
    next: &ReleaseMarker,
    range: F,
) -> SchemaError
where
    F: Fn(i64) -> String,
{
    SchemaError::RevisionOutOfRange {
        kind,
        offset,
        release: release.name.clone(),
        release_version: release.version,
        next_release: next.name.clone(),
        next_version: next.version,
        range: range(i64::from(next.version) - i64::from(release.version)),
    }
}
