//! Repository for registry rows.
//!
//! The registry holds every entry the user has acted on. An entry whose status
//! falls back to [`Status::Downloadable`] has nothing left worth remembering,
//! so writing it removes its row instead.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::EntryRow;
use exn::ResultExt;
use knewstuff_feed::models::{Entry, EntryKey, Status};
use sqlx::SqlitePool;
use tracing::instrument;

/// What writing a batch of entries did to the registry table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub upserted: usize,
    pub deleted: usize,
}
impl Applied {
    pub fn total(&self) -> usize {
        self.upserted + self.deleted
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Write a batch of entries in a single transaction.
    ///
    /// Entries with a persisted status are upserted, entries that are merely
    /// [`Status::Downloadable`] are deleted.
    #[instrument(skip_all, fields(count = entries.len()))]
    pub async fn apply(&self, entries: &[Entry]) -> Result<Applied> {
        let mut applied = Applied::default();
        if self.dry_run || entries.is_empty() {
            return Ok(applied);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for entry in entries {
            if entry.status == Status::Downloadable {
                sqlx::query(include_str!("../queries/delete_entry.sql"))
                    .bind(&entry.provider_id)
                    .bind(&entry.unique_id)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                applied.deleted += 1;
                continue;
            }
            let row = EntryRow::try_from(entry)?;
            sqlx::query(include_str!("../queries/upsert_entry.sql"))
                .bind(row.provider_id)
                .bind(row.unique_id)
                .bind(row.name)
                .bind(row.category)
                .bind(row.license)
                .bind(row.version)
                .bind(row.update_version)
                .bind(row.release_date)
                .bind(row.update_release_date)
                .bind(row.author)
                .bind(row.summary)
                .bind(row.short_summary)
                .bind(row.changelog)
                .bind(row.homepage)
                .bind(row.payload)
                .bind(row.previews)
                .bind(row.rating)
                .bind(row.downloads)
                .bind(row.fans)
                .bind(row.donation_link)
                .bind(row.installed_files)
                .bind(row.download_links)
                .bind(row.status)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            applied.upserted += 1;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(applied)
    }

    /// Remove a single entry from the registry.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete(&self, key: &EntryKey) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(&key.provider_id)
            .bind(&key.unique_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List every registered entry, ordered by provider then unique ID.
    pub async fn list_all(&self) -> Result<Vec<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_registry.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Entry::try_from).collect()
    }

    pub async fn list_for_provider(&self, provider_id: impl AsRef<str>) -> Result<Vec<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_registry_for_provider.sql"))
            .bind(provider_id.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Entry::try_from).collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_registry.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knewstuff_feed::models::Source;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn entry(provider: &str, id: &str, status: Status) -> Entry {
        let mut entry = Entry::new(provider, id);
        entry.name = format!("Entry {id}");
        entry.status = status;
        entry
    }

    #[tokio::test]
    async fn test_upsert_then_list() {
        let repo = repo().await;
        let applied = repo
            .apply(&[entry("a", "1", Status::Installed), entry("b", "2", Status::Deleted)])
            .await
            .unwrap();
        assert_eq!(applied, Applied { upserted: 2, deleted: 0 });

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|e| e.source == Source::Registry));
        assert_eq!(all[0].status, Status::Installed);

        let only_b = repo.list_for_provider("b").await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].status, Status::Deleted);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let repo = repo().await;
        repo.apply(&[entry("a", "1", Status::Installed)]).await.unwrap();
        let mut updated = entry("a", "1", Status::Updateable);
        updated.update_version = "2.0".to_string();
        repo.apply(&[updated]).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, Status::Updateable);
        assert_eq!(all[0].update_version, "2.0");
    }

    #[tokio::test]
    async fn test_downloadable_entries_are_removed() {
        let repo = repo().await;
        repo.apply(&[entry("a", "1", Status::Installed), entry("a", "2", Status::Installed)]).await.unwrap();
        let applied = repo.apply(&[entry("a", "1", Status::Downloadable)]).await.unwrap();
        assert_eq!(applied, Applied { upserted: 0, deleted: 1 });
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_missing_rows() {
        let repo = repo().await;
        repo.apply(&[entry("a", "1", Status::Installed)]).await.unwrap();
        assert!(repo.delete(&EntryKey::new("a", "1")).await.unwrap());
        assert!(!repo.delete(&EntryKey::new("a", "1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let repo = repo().await;
        let dry = Repository::new(repo.pool.clone(), true);
        dry.apply(&[entry("a", "1", Status::Installed)]).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
