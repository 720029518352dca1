//! Schema version tracking.
//!
//! The revision a database is at is stored in SQLite's `user_version`
//! header field. A fresh database reports 0. Writes are transactional, so a
//! version written inside a transaction is rolled back with it.

use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::error::Result;

/// Reads and writes the stored schema version.
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pool: SqlitePool,
}

impl SchemaVersion {
    /// Creates a version tracker for a pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the stored version.
    pub async fn get(&self) -> Result<i32> {
        let mut conn = self.pool.acquire().await?;
        Self::read(&mut conn).await
    }

    /// Stores a version.
    pub async fn set(&self, version: i32) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write(&mut conn, version).await
    }

    /// Returns the version stored in the database behind `conn`.
    pub async fn read(conn: &mut SqliteConnection) -> Result<i32> {
        let row: (i32,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.0)
    }

    /// Stores `version` through `conn`.
    pub async fn write(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        // PRAGMA arguments cannot be bound.
        sqlx::query(&format!("PRAGMA user_version = {version}"))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
