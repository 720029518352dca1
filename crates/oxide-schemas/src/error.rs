//! Error types for schema declaration, reconstruction and upgrades.

use crate::operations::OperationId;

/// Errors raised while declaring schemas, reconstructing old revisions or
/// migrating a live database.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A table definition or downgrade without any operation.
    #[error("Schema part for table {table} should contain at least one operation")]
    EmptyTable {
        /// Table name.
        table: String,
    },

    /// The same table declared twice in one scope.
    #[error("Duplicate table {table} in {scope}")]
    DuplicateTable {
        /// Table name.
        table: String,
        /// Where the duplicate was found, e.g. "current schema".
        scope: String,
    },

    /// Two operations on the same column or constraint in one schema part.
    #[error("Duplicate operations on {id} in {table}")]
    DuplicateOperation {
        /// Table name.
        table: String,
        /// Identity shared by both operations.
        id: OperationId,
    },

    /// `DropTable` declared together with other operations.
    #[error(
        "DropTable operation in downgrade definition for table {table} cannot be mixed with other operations"
    )]
    DropTableMixed {
        /// Table name.
        table: String,
    },

    /// A drop operation inside a current table definition.
    #[error("{operation} is not allowed in the current definition of table {table}")]
    DropInDefinition {
        /// Table name.
        table: String,
        /// Description of the offending operation.
        operation: String,
    },

    /// `downgrade_to` with a negative offset.
    #[error("Downgrade offset cannot be negative (got {offset})")]
    NegativeDowngradeOffset {
        /// Declared offset.
        offset: i32,
    },

    /// `upgrade_to` with an offset that is not positive.
    #[error("In upgradeTo({offset}, ...): Upgrade offset should be greater than 0")]
    NonPositiveUpgradeOffset {
        /// Declared offset.
        offset: i32,
    },

    /// `upgrade_to` without migrations.
    #[error("In upgradeTo({offset}, ...): migrations cannot be empty")]
    EmptyUpgrade {
        /// Declared offset.
        offset: i32,
    },

    /// `upgrade_to` with nothing but the automatic migration.
    #[error(
        "In upgradeTo({offset}, ...): upgrades with a single auto() migration are implicitly performed for every revision without explicit upgradeTo()"
    )]
    LoneAutoMigration {
        /// Declared offset.
        offset: i32,
    },

    /// `upgrade_to` with the automatic migration listed more than once.
    #[error("In upgradeTo({offset}, ...): only one auto() migration per upgrade is allowed")]
    MultipleAutoMigrations {
        /// Declared offset.
        offset: i32,
    },

    /// Offsets within a release section must descend.
    #[error("Downgrades and upgrades definitions should have descending offsets. {reason}")]
    NonDescendingOffset {
        /// Explanation naming the offending offsets.
        reason: String,
    },

    /// Release markers must have non-ascending versions.
    #[error(
        "Releases should have non-ascending revision numbers. The previous release had version number {previous}, so the release with revision number {version} is not valid"
    )]
    AscendingRelease {
        /// Version of the previously declared release.
        previous: i32,
        /// Version of the rejected release.
        version: i32,
    },

    /// An offset that resolves to a revision beyond the next release.
    #[error(
        "The {kind} with offset {offset} defined between release {release} with version {release_version} and release {next_release} with version {next_version} is outside of valid range {range}."
    )]
    RevisionOutOfRange {
        /// "downgrade" or "upgrade".
        kind: &'static str,
        /// Declared offset.
        offset: i32,
        /// Release the offset is relative to.
        release: String,
        /// Its version.
        release_version: i32,
        /// The newer release bounding the section.
        next_release: String,
        /// Its version.
        next_version: i32,
        /// The valid offset range, rendered.
        range: String,
    },

    /// A downgrade drops a column the newer revision does not have.
    #[error("Trying to drop non existing column {table}.{column} while building {revision}")]
    MissingColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Description of the revision being built.
        revision: String,
    },

    /// A downgrade drops a constraint the newer revision does not have.
    #[error(
        "Trying to drop non existing constraint '{constraint}' on table {table} while building {revision}"
    )]
    MissingConstraint {
        /// Table name.
        table: String,
        /// Constraint definition.
        constraint: String,
        /// Description of the revision being built.
        revision: String,
    },

    /// A downgrade drops something from a table the newer revision does not have.
    #[error("Trying to {operation} on non existing table {table} while building {revision}")]
    MissingTable {
        /// Table name.
        table: String,
        /// Description of the offending operation.
        operation: String,
        /// Description of the revision being built.
        revision: String,
    },

    /// A revision that cannot be reconstructed from the cache.
    #[error(
        "Trying to retrieve version {requested}, which is higher than current schema version (lowest prepared: {lowest})"
    )]
    RevisionUnavailable {
        /// Requested revision.
        requested: i32,
        /// Lowest revision present in the cache.
        lowest: i32,
    },

    /// An offset that cannot be turned into a revision number.
    #[error(
        "Offset {offset} above release version {base} is outside of the revision number range"
    )]
    RevisionOverflow {
        /// Declared offset.
        offset: i32,
        /// Version of the release the offset is relative to.
        base: i32,
    },

    /// An upgrade target above the newest declared revision.
    #[error(
        "Cannot upgrade to version {requested}, which is higher than current schema version {current}"
    )]
    RevisionAboveCurrent {
        /// Requested revision.
        requested: i32,
        /// Newest declared revision.
        current: i32,
    },

    /// A table that does not exist at the requested revision.
    #[error("Schema for version {version} doesn't contain table {table}")]
    UnknownTable {
        /// Table name.
        table: String,
        /// Revision queried.
        version: i32,
    },

    /// A drop operation reached a stage that only accepts resolved schemas.
    #[error("Received {operation} operation for building create statement of table {table}")]
    UnresolvedOperation {
        /// Table name.
        table: String,
        /// Description of the offending operation.
        operation: String,
    },

    /// The stored schema version is newer than the requested one.
    #[error("Cannot downgrade database from version {stored} to {requested}")]
    Downgrade {
        /// Version stored in the database.
        stored: i32,
        /// Version requested by the caller.
        requested: i32,
    },

    /// Foreign key enforcement is on and could not be turned off, which
    /// happens inside a transaction.
    #[error(
        "Foreign key enforcement cannot be turned off inside a transaction; run PRAGMA foreign_keys = OFF before starting the upgrade"
    )]
    ForeignKeysEnforced,

    /// Rows referencing missing parent rows after an upgrade.
    #[error(
        "{count} foreign key violation(s) after upgrade, first in table {table} referencing {parent}"
    )]
    ForeignKeyViolation {
        /// Child table of the first violation.
        table: String,
        /// Parent table of the first violation.
        parent: String,
        /// Number of violating rows.
        count: usize,
    },

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SchemaError {
    /// Returns true for errors raised while declaring schemas.
    ///
    /// Everything else comes from reconstruction, migration or the database.
    #[must_use]
    pub const fn is_declaration(&self) -> bool {
        matches!(
            self,
            Self::EmptyTable { .. }
                | Self::DuplicateTable { .. }
                | Self::DuplicateOperation { .. }
                | Self::DropTableMixed { .. }
                | Self::DropInDefinition { .. }
                | Self::NegativeDowngradeOffset { .. }
                | Self::NonPositiveUpgradeOffset { .. }
                | Self::EmptyUpgrade { .. }
                | Self::LoneAutoMigration { .. }
                | Self::MultipleAutoMigrations { .. }
                | Self::NonDescendingOffset { .. }
                | Self::AscendingRelease { .. }
                | Self::RevisionOutOfRange { .. }
                | Self::RevisionOverflow { .. }
        )
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
