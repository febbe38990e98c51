//! SQLite pool behind the registry.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// A single engine task writes; a second engine for the same application is
// the only other client.
const MAX_CONNECTIONS: u32 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn with_options(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open the registry file at `path`, creating it (and its directory) on
    /// first use. Migrations are applied before this returns.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Directory(parent.to_path_buf()))?;
        }
        debug!(path = %path.display(), "opening registry database");
        let options = Self::options().filename(path).create_if_missing(true);
        Self::with_options(options, MAX_CONNECTIONS).await
    }

    /// A registry that lives only as long as the pool.
    ///
    /// Not limited to `#[cfg(test)]`: the engine uses it for throwaway sessions.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every in-memory connection is its own database.
        Self::with_options(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("cache_size", "-2048")
            .pragma("temp_store", "MEMORY")
    }

    #[instrument("migrating registry database", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. The pool is unusable afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database) -> i64 {
        let row: (i64,) =
            sqlx::query_as(include_str!("../queries/count_registry.sql")).fetch_one(db.pool()).await.unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_in_memory_registry_starts_empty() {
        let db = Database::connect_in_memory().await.unwrap();
        assert_eq!(count(&db).await, 0);
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_run_once() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(count(&db).await, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knewstuff").join("wallpaper.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }
}
