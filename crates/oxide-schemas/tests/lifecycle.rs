//! Opening file-backed databases across schema versions.

mod common;

use std::path::Path;

use common::{column, contacts_schemas, downgrade, live_columns, set, table};
use oxide_schemas::migrations;
use oxide_schemas::prelude::*;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

async fn open_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite database")
}

#[tokio::test]
async fn test_fresh_database_is_created_at_version() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("contacts.db")).await;
    let schemas = contacts_schemas();

    let outcome = open_database(&pool, &schemas, 4).await.unwrap();

    assert_eq!(outcome, OpenOutcome::Created { version: 4 });
    assert_eq!(SchemaVersion::new(pool.clone()).get().await.unwrap(), 4);
    assert_eq!(
        live_columns(&pool, "contacts").await,
        set(&["created_at", "id", "updated_at"])
    );
}

#[tokio::test]
async fn test_reopening_upgrades_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");
    let schemas = contacts_schemas();

    {
        let pool = open_pool(&path).await;
        let outcome = open_database(&pool, &schemas, 2).await.unwrap();
        assert_eq!(outcome, OpenOutcome::Created { version: 2 });

        sqlx::query("INSERT INTO contacts(id, created_at) VALUES (1, 100), (2, 200)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let pool = open_pool(&path).await;
    let outcome = open_database(&pool, &schemas, 4).await.unwrap();

    assert_eq!(outcome, OpenOutcome::Upgraded { from: 2, to: 4 });
    assert_eq!(SchemaVersion::new(pool.clone()).get().await.unwrap(), 4);

    let ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM contacts ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(ids, vec![(1,), (2,)]);
}

#[tokio::test]
async fn test_opening_at_stored_version_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("contacts.db")).await;
    let schemas = contacts_schemas();

    open_database(&pool, &schemas, 3).await.unwrap();
    let outcome = open_database(&pool, &schemas, 3).await.unwrap();

    assert_eq!(outcome, OpenOutcome::Current { version: 3 });
}

#[tokio::test]
async fn test_opening_at_older_version_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("contacts.db")).await;
    let schemas = contacts_schemas();

    open_database(&pool, &schemas, 4).await.unwrap();
    let err = open_database(&pool, &schemas, 2).await.unwrap_err();

    assert!(matches!(
        err,
        SchemaError::Downgrade {
            stored: 4,
            requested: 2
        }
    ));
}

#[tokio::test]
async fn test_opening_above_current_revision_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("contacts.db")).await;
    let schemas = contacts_schemas();

    let err = open_database(&pool, &schemas, 5).await.unwrap_err();
    assert!(matches!(err, SchemaError::RevisionAboveCurrent { .. }));
    assert_eq!(SchemaVersion::new(pool.clone()).get().await.unwrap(), 0);

    open_database(&pool, &schemas, 2).await.unwrap();
    let err = open_database(&pool, &schemas, 5).await.unwrap_err();
    assert!(matches!(
        err,
        SchemaError::RevisionAboveCurrent {
            requested: 5,
            current: 4
        }
    ));
    assert_eq!(SchemaVersion::new(pool).get().await.unwrap(), 2);
}

struct BrokenMigration;

impl Migration for BrokenMigration {
    fn apply<'a>(
        &'a self,
        _version: i32,
        db: &'a mut dyn Database,
        _ctx: &'a MigrationContext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            db.execute("CREATE TABLE audit(id INTEGER)").await?;
            db.execute("THIS IS NOT SQL").await
        })
    }
}

#[tokio::test]
async fn test_failed_step_keeps_last_applied_version() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("notes.db")).await;
    let notes = table("notes", vec![column("id"), column("a"), column("b")]);
    let schemas = Schemas::builder(3, vec![notes])
        .unwrap()
        .upgrade_to(3, vec![Box::new(BrokenMigration) as Box<dyn Migration>])
        .unwrap()
        .downgrade_to(
            2,
            vec![downgrade("notes", vec![TableOperation::drop_column("b")])],
        )
        .unwrap()
        .downgrade_to(
            1,
            vec![downgrade("notes", vec![TableOperation::drop_column("a")])],
        )
        .unwrap()
        .build()
        .unwrap();

    open_database(&pool, &schemas, 1).await.unwrap();
    let err = open_database(&pool, &schemas, 3).await.unwrap_err();

    assert!(matches!(err, SchemaError::Database(_)));
    assert_eq!(SchemaVersion::new(pool.clone()).get().await.unwrap(), 2);
    assert_eq!(live_columns(&pool, "notes").await, set(&["a", "id"]));
    assert!(!common::live_tables(&pool).await.contains("audit"));
}

#[tokio::test]
async fn test_upgrade_keeps_referencing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("crm.db")).await;
    let schemas = Schemas::builder(
        2,
        vec![
            table(
                "contacts",
                vec![
                    TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
                    TableOperation::add_column("email", "TEXT"),
                ],
            ),
            table(
                "deals",
                vec![
                    TableOperation::add_column("id", "INTEGER PRIMARY KEY"),
                    TableOperation::add_column("contact_id", "INTEGER REFERENCES contacts(id)"),
                ],
            ),
        ],
    )
    .unwrap()
    .downgrade_to(
        1,
        vec![downgrade("contacts", vec![TableOperation::drop_column("email")])],
    )
    .unwrap()
    .build()
    .unwrap();

    open_database(&pool, &schemas, 1).await.unwrap();
    sqlx::query("INSERT INTO contacts(id) VALUES (1)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO deals(id, contact_id) VALUES (7, 1)")
        .execute(&pool)
        .await
        .unwrap();

    let outcome = open_database(&pool, &schemas, 2).await.unwrap();
    assert_eq!(outcome, OpenOutcome::Upgraded { from: 1, to: 2 });

    let deals: Vec<(i64, i64)> = sqlx::query_as("SELECT id, contact_id FROM deals")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(deals, vec![(7, 1)]);

    let enforced: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(enforced.0, 1);
}

#[tokio::test]
async fn test_step_leaving_dangling_references_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("crm.db")).await;
    let schemas = Schemas::builder(
        2,
        vec![
            table("contacts", vec![TableOperation::add_column("id", "INTEGER PRIMARY KEY")]),
            table(
                "deals",
                vec![TableOperation::add_column("contact_id", "INTEGER REFERENCES contacts(id)")],
            ),
        ],
    )
    .unwrap()
    .upgrade_to(2, vec![migrations::recreate(["contacts"])])
    .unwrap()
    .build()
    .unwrap();

    open_database(&pool, &schemas, 1).await.unwrap();
    sqlx::query("INSERT INTO contacts(id) VALUES (1)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO deals(contact_id) VALUES (1)")
        .execute(&pool)
        .await
        .unwrap();

    let err = open_database(&pool, &schemas, 2).await.unwrap_err();

    assert!(matches!(err, SchemaError::ForeignKeyViolation { count: 1, .. }));
    assert_eq!(SchemaVersion::new(pool.clone()).get().await.unwrap(), 1);
    let contacts: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(contacts.0, 1);
}
