//! The per-application cache owned by the engine.
//!
//! Two stores live here:
//! - the **registry**: every entry the user has acted on, loaded from SQLite
//!   at start-up and written back whenever an entry changes;
//! - the **request index**: result pages of recent searches, keyed by the
//!   request without its page. It never touches disk.

use futures::FutureExt;
use futures::future::BoxFuture;
use knewstuff_feed::models::{Entry, EntryKey, RequestKey, SearchRequest, Status};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::repo::{Applied, Repository};
use crate::Database;

/// Outcome of a registry flush, carrying the entries it tried to write so a
/// failed flush can put them back.
#[derive(Debug)]
pub struct Flushed {
    pub entries: Vec<Entry>,
    pub result: Result<Applied>,
}

pub struct Cache {
    app: String,
    database: Database,
    repository: Repository,
    registry: BTreeMap<EntryKey, Entry>,
    /// Latest state of every entry changed since the last flush.
    dirty: BTreeMap<EntryKey, Entry>,
    requests: HashMap<RequestKey, BTreeMap<u32, Vec<Entry>>>,
}

impl Cache {
    fn new(app: impl Into<String>, database: Database) -> Self {
        Self {
            app: app.into(),
            repository: Repository::from(&database),
            database,
            registry: BTreeMap::new(),
            dirty: BTreeMap::new(),
            requests: HashMap::new(),
        }
    }

    /// Open (or create) the registry of an application inside `dir`.
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub async fn open(app: &str, dir: impl AsRef<Path>) -> Result<Self> {
        let database = Database::connect(Self::database_path(app, dir.as_ref())).await?;
        Ok(Self::new(app, database))
    }

    /// A cache backed by an in-memory database; nothing survives the process.
    pub async fn in_memory(app: &str) -> Result<Self> {
        Ok(Self::new(app, Database::connect_in_memory().await?))
    }

    pub fn database_path(app: &str, dir: &Path) -> PathBuf {
        dir.join(format!("{app}.sqlite"))
    }

    /// Application identity this cache belongs to.
    pub fn app(&self) -> &str {
        &self.app
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Replace the in-memory registry with what is on disk.
    #[instrument(skip(self), fields(app = %self.app))]
    pub async fn read_registry(&mut self) -> Result<usize> {
        let entries = self.repository.list_all().await?;
        self.registry = entries.into_iter().map(|entry| (entry.key(), entry)).collect();
        self.dirty.clear();
        info!(count = self.registry.len(), "registry loaded");
        Ok(self.registry.len())
    }

    /// Registered entries of one provider, ordered by unique ID.
    pub fn registry_for_provider(&self, provider_id: &str) -> Vec<Entry> {
        self.registry.values().filter(|entry| entry.provider_id == provider_id).cloned().collect()
    }

    pub fn registered(&self, key: &EntryKey) -> Option<&Entry> {
        self.registry.get(key)
    }

    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    /// Record the latest state of an entry.
    ///
    /// A Downloadable entry leaves the registry; its row is deleted with the
    /// next flush. Cached result pages holding the same item are updated too,
    /// so a later reload shows the new status.
    pub fn register_changed_entry(&mut self, entry: &Entry) {
        let key = entry.key();
        for pages in self.requests.values_mut() {
            for cached in pages.values_mut().flatten().filter(|cached| cached.is_same_item(entry)) {
                *cached = entry.clone();
            }
        }
        if entry.status == Status::Downloadable {
            if self.registry.remove(&key).is_some() {
                debug!(entry = %key, "entry left the registry");
            }
        } else {
            self.registry.insert(key.clone(), entry.clone());
        }
        self.dirty.insert(key, entry.clone());
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Take every changed entry and return a future writing them to disk.
    ///
    /// The future does not borrow the cache, so the caller can drive it
    /// alongside other work. Hand a failed [`Flushed`] back to
    /// [`Cache::restore`] to retry it with the next flush.
    pub fn flush(&mut self) -> BoxFuture<'static, Flushed> {
        let entries: Vec<Entry> = std::mem::take(&mut self.dirty).into_values().collect();
        let repository = self.repository.clone();
        async move {
            let result = repository.apply(&entries).await;
            Flushed { entries, result }
        }
        .boxed()
    }

    /// Mark the entries of a failed flush as changed again, unless they have
    /// changed since.
    pub fn restore(&mut self, flushed: &Flushed) {
        if flushed.result.is_err() {
            for entry in &flushed.entries {
                self.dirty.entry(entry.key()).or_insert_with(|| entry.clone());
            }
        }
    }

    /// Write every changed entry and wait for it.
    pub async fn write_registry(&mut self) -> Result<Applied> {
        let flushed = self.flush().await;
        self.restore(&flushed);
        flushed.result
    }

    /// Final flush, then release the database.
    #[instrument(skip(self), fields(app = %self.app))]
    pub async fn close(mut self) -> Result<Applied> {
        let result = self.write_registry().await;
        self.database.close().await;
        result
    }

    // =========================================================================
    // Request index
    // =========================================================================

    /// The stored result page for this request, or nothing.
    pub fn request_from_cache(&self, request: &SearchRequest) -> Vec<Entry> {
        let found = self.requests.get(&request.without_page()).and_then(|pages| pages.get(&request.page));
        match found {
            Some(entries) => {
                debug!(%request, count = entries.len(), "request cache hit");
                entries.clone()
            },
            None => {
                debug!(%request, "request cache miss");
                Vec::new()
            },
        }
    }

    /// Store a result page. Items already stored for the same page are kept
    /// once. Installed and update listings are local state and never stored.
    pub fn insert_request(&mut self, request: &SearchRequest, entries: &[Entry]) {
        if request.sort_mode.is_local_status() {
            return;
        }
        let page = self.requests.entry(request.without_page()).or_default().entry(request.page).or_default();
        for entry in entries {
            if !page.contains(entry) {
                page.push(entry.clone());
            }
        }
    }

    /// Forget every stored result page.
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use knewstuff_feed::models::{SortMode, Source};
    use rstest::rstest;

    fn entry(provider: &str, id: &str) -> Entry {
        let mut entry = Entry::new(provider, id);
        entry.name = format!("Entry {id}");
        entry.version = "1.0".to_string();
        entry
    }

    fn with_status(mut entry: Entry, status: Status) -> Entry {
        entry.status = status;
        entry
    }

    #[tokio::test]
    async fn test_registered_entry_keeps_latest_fields() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Installing));
        let mut installed = with_status(entry("a", "1"), Status::Installed);
        installed.installed_files = vec!["/tmp/one.png".to_string()];
        cache.register_changed_entry(&installed);
        cache.register_changed_entry(&with_status(entry("b", "1"), Status::Installed));

        let registered = cache.registry_for_provider("a");
        assert_eq!(registered.len(), 1);
        assert!(registered[0].same_fields(&installed));
        assert!(cache.is_dirty());
    }

    #[tokio::test]
    async fn test_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::open("wallpapers", dir.path()).await.unwrap();
        let mut installed = with_status(entry("a", "1"), Status::Installed);
        installed.installed_files = vec!["/tmp/one.png".to_string()];
        cache.register_changed_entry(&installed);
        cache.register_changed_entry(&with_status(entry("a", "2"), Status::Deleted));
        let applied = cache.close().await.unwrap();
        assert_eq!(applied.upserted, 2);
        assert!(Cache::database_path("wallpapers", dir.path()).exists());

        let mut cache = Cache::open("wallpapers", dir.path()).await.unwrap();
        assert_eq!(cache.read_registry().await.unwrap(), 2);
        let registered = cache.registry_for_provider("a");
        assert!(registered[0].same_fields(&installed));
        assert_eq!(registered[0].source, Source::Registry);
        assert_eq!(registered[1].status, Status::Deleted);
        assert!(!cache.is_dirty());
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Installed));
        assert_eq!(cache.write_registry().await.unwrap().total(), 1);
        assert_eq!(cache.write_registry().await.unwrap().total(), 0);
        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Downloadable));
        assert_eq!(cache.write_registry().await.unwrap().deleted, 1);
        assert_eq!(cache.read_registry().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_downloadable_entry_leaves_registry() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Installing));
        assert!(cache.registered(&EntryKey::new("a", "1")).is_some());

        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Downloadable));
        assert!(cache.registered(&EntryKey::new("a", "1")).is_none());
        assert!(cache.registry_for_provider("a").is_empty());
        assert_eq!(cache.registry_len(), 0);
        assert!(cache.is_dirty());
        cache.write_registry().await.unwrap();
        assert_eq!(cache.read_registry().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_request_from_cache_is_stable() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        let request = SearchRequest::new(SortMode::Newest);
        cache.insert_request(&request, &[entry("a", "1"), entry("a", "2")]);

        let first = cache.request_from_cache(&request);
        let second = cache.request_from_cache(&request);
        assert_eq!(first.len(), 2);
        assert!(first.iter().zip(&second).all(|(a, b)| a.same_fields(b)));
        assert!(cache.request_from_cache(&request.clone().with_page(1)).is_empty());
    }

    #[tokio::test]
    async fn test_insert_request_keeps_items_once() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        let request = SearchRequest::new(SortMode::Rating);
        cache.insert_request(&request, &[entry("a", "1")]);
        cache.insert_request(&request, &[entry("a", "1"), entry("b", "1")]);
        assert_eq!(cache.request_from_cache(&request).len(), 2);
    }

    #[rstest]
    #[case(SortMode::Installed)]
    #[case(SortMode::Updates)]
    #[tokio::test]
    async fn test_local_listings_are_not_indexed(#[case] sort: SortMode) {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        let request = SearchRequest::new(sort);
        cache.insert_request(&request, &[with_status(entry("a", "1"), Status::Installed)]);
        assert!(cache.request_from_cache(&request).is_empty());
    }

    #[tokio::test]
    async fn test_changed_entry_refreshes_indexed_pages() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        let request = SearchRequest::new(SortMode::Newest);
        cache.insert_request(&request, &[entry("a", "1"), entry("a", "2")]);
        cache.register_changed_entry(&with_status(entry("a", "2"), Status::Installed));

        let page = cache.request_from_cache(&request);
        assert_eq!(page[0].status, Status::Downloadable);
        assert_eq!(page[1].status, Status::Installed);
    }

    #[tokio::test]
    async fn test_failed_flush_is_restored() {
        let mut cache = Cache::in_memory("wallpapers").await.unwrap();
        cache.register_changed_entry(&with_status(entry("a", "1"), Status::Installed));
        let mut flushed = cache.flush().await;
        assert!(!cache.is_dirty());
        flushed.result = Err(exn::Exn::from(ErrorKind::Database));
        cache.restore(&flushed);
        assert!(cache.is_dirty());
    }
}
