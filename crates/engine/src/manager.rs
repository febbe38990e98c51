//! A small facade over [`Engine`] for applications that only need to search,
//! install and check for updates.

use async_stream::stream;
use futures::Stream;
use knewstuff_feed::models::{Entry, SortMode};
use std::path::Path;
use tracing::{debug, warn};

use crate::engine::{Engine, EngineEvents, EngineOptions};
use crate::error::Result;
use crate::event::EngineEvent;

const DEFAULT_PAGE_SIZE: u32 = 100;
/// Download link used for installs started through the manager.
const DEFAULT_LINK_ID: u32 = 1;

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    ProvidersReady,
    /// No provider is usable; nothing queued or requested will be answered.
    ProvidersUnavailable,
    SearchResult(Vec<Entry>),
    UpdatesAvailable(Vec<Entry>),
    EntryStatusChanged(Entry),
    ErrorFound(String),
    Busy(String),
    Idle,
}

/// Work asked for before the providers were ready.
#[derive(Debug, Default)]
struct Queued {
    search: bool,
    updates: bool,
    installed: bool,
}

pub struct DownloadManager {
    engine: Engine,
    events: EngineEvents,
    ready: bool,
    queued: Queued,
    page: u32,
    page_size: u32,
}

impl DownloadManager {
    /// Start an engine for the named configuration.
    pub async fn new(name: impl AsRef<Path>, options: EngineOptions) -> Result<Self> {
        let (engine, events) = Engine::init(name, options).await?;
        Ok(Self::from_engine(engine, events))
    }

    pub fn from_engine(engine: Engine, events: EngineEvents) -> Self {
        Self { engine, events, ready: false, queued: Queued::default(), page: 0, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn search(&mut self, page: u32, page_size: u32) {
        self.page = page;
        self.page_size = page_size;
        if self.ready {
            self.engine.request_data(page, page_size);
        } else {
            self.queued.search = true;
        }
    }

    pub fn check_for_updates(&mut self) {
        if self.ready {
            self.engine.check_for_updates();
        } else {
            self.queued.updates = true;
        }
    }

    pub fn check_for_installed(&mut self) {
        if self.ready {
            self.engine.check_for_installed();
        } else {
            self.queued.installed = true;
        }
    }

    /// Only the four result orderings apply here; local listings have their
    /// own checks.
    pub fn set_search_order(&self, order: SortMode) {
        if order.is_local_status() {
            warn!(%order, "not a search order");
            return;
        }
        self.engine.set_sort_mode(order);
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        self.engine.set_search_term(term);
    }

    pub fn install_entry(&self, entry: Entry) {
        if Self::is_valid(&entry) {
            self.engine.install(entry, DEFAULT_LINK_ID);
        }
    }

    pub fn uninstall_entry(&self, entry: Entry) {
        if Self::is_valid(&entry) {
            self.engine.uninstall(entry);
        }
    }

    fn is_valid(entry: &Entry) -> bool {
        let valid = !entry.provider_id.is_empty() && !entry.unique_id.is_empty();
        if !valid {
            debug!(entry = %entry.key(), "ignoring entry without identity");
        }
        valid
    }

    /// Run the most important request queued before the providers were ready.
    fn run_queued(&mut self) {
        let queued = std::mem::take(&mut self.queued);
        if queued.installed {
            self.engine.check_for_installed();
        } else if queued.updates {
            self.engine.check_for_updates();
        } else if queued.search {
            self.engine.request_data(self.page, self.page_size);
        }
    }

    fn translate(&mut self, event: EngineEvent) -> Option<DownloadEvent> {
        Some(match event {
            EngineEvent::ProvidersLoaded => {
                debug!("providers loaded");
                self.ready = true;
                self.run_queued();
                DownloadEvent::ProvidersReady
            },
            EngineEvent::ProvidersUnavailable => {
                warn!(queued = ?self.queued, "no providers available");
                self.queued = Queued::default();
                DownloadEvent::ProvidersUnavailable
            },
            EngineEvent::EntriesLoaded { entries, .. } => DownloadEvent::SearchResult(entries),
            EngineEvent::UpdateableEntriesLoaded(entries) => DownloadEvent::UpdatesAvailable(entries),
            EngineEvent::EntryChanged(entry) => DownloadEvent::EntryStatusChanged(entry),
            EngineEvent::Error(message) | EngineEvent::AuthenticationMissing { message, .. } => {
                warn!(%message, "engine error");
                DownloadEvent::ErrorFound(message)
            },
            EngineEvent::Busy(message) => DownloadEvent::Busy(message),
            EngineEvent::Idle => DownloadEvent::Idle,
            _ => return None,
        })
    }

    /// The next event, or `None` once the engine has stopped.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        loop {
            let event = self.events.recv().await?;
            if let Some(event) = self.translate(event) {
                return Some(event);
            }
        }
    }

    pub fn events(&mut self) -> impl Stream<Item = DownloadEvent> + '_ {
        stream! {
            while let Some(event) = self.next_event().await {
                yield event;
            }
        }
    }

    pub async fn close(self) -> Result<()> {
        self.engine.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::MockInstallation;
    use futures::StreamExt;
    use knewstuff_config::{Config, InstallTarget, Paths, SectionVersion};
    use knewstuff_feed::models::Status;
    use knewstuff_provider::MockProvider;
    use knewstuff_provider::fetch::MockFetcher;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn manager(provider: Arc<MockProvider>) -> DownloadManager {
        let config = Config {
            app: "icons".to_string(),
            path: PathBuf::from("/etc/xdg/icons.knsrc"),
            section: SectionVersion::KNewStuff3,
            categories: Vec::new(),
            providers_url: None,
            install_target: InstallTarget::Absolute(PathBuf::from("/srv/icons")),
        };
        let options = EngineOptions::default()
            .in_memory()
            .with_paths(Paths::rooted("/nonexistent"))
            .with_fetcher(Arc::new(MockFetcher::default()))
            .with_installation(Arc::new(MockInstallation::default()))
            .with_provider(provider);
        let (engine, events) = Engine::with_config(config, options).await.unwrap();
        DownloadManager::from_engine(engine, events)
    }

    async fn next(manager: &mut DownloadManager) -> DownloadEvent {
        match tokio::time::timeout(Duration::from_secs(10), manager.next_event()).await {
            Ok(Some(event)) => event,
            other => panic!("expected another event, got {other:?}"),
        }
    }

    fn icons() -> Vec<Entry> {
        (0..3)
            .map(|i| {
                let mut entry = Entry::new("mock", format!("icon-{i}"));
                entry.name = entry.unique_id.clone();
                entry
            })
            .collect()
    }

    #[tokio::test]
    async fn test_queued_requests_run_once_ready_by_priority() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider::new("mock").with_listing(icons()).with_init_gate(gate.clone()));
        let mut manager = manager(provider.clone()).await;

        manager.search(0, 10);
        manager.check_for_updates();
        assert!(!manager.is_ready());
        gate.notify_one();

        while !matches!(next(&mut manager).await, DownloadEvent::ProvidersReady) {}
        assert!(manager.is_ready());
        loop {
            match next(&mut manager).await {
                DownloadEvent::UpdatesAvailable(entries) => {
                    assert!(entries.is_empty());
                    break;
                },
                DownloadEvent::SearchResult(_) => panic!("search should have been superseded"),
                _ => {},
            }
        }
        let calls = provider.load_entries_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sort_mode, SortMode::Updates);
    }

    #[tokio::test]
    async fn test_queued_search_is_dropped_without_providers() {
        let provider = Arc::new(MockProvider::new("mock").with_listing(icons()).failing_initialize());
        let mut manager = manager(provider.clone()).await;
        manager.search(0, 10);

        let mut errors = 0;
        loop {
            match next(&mut manager).await {
                DownloadEvent::ProvidersUnavailable => break,
                DownloadEvent::ErrorFound(message) => {
                    assert!(message.contains("mock"));
                    errors += 1;
                },
                DownloadEvent::ProvidersReady | DownloadEvent::SearchResult(_) => panic!("no provider should be ready"),
                _ => {},
            }
        }
        assert_eq!(errors, 1);
        assert!(!manager.is_ready());
        assert!(provider.load_entries_calls().is_empty());
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_search_and_install_through_event_stream() {
        let provider = Arc::new(MockProvider::new("mock").with_listing(icons()));
        let mut manager = manager(provider).await;
        manager.search(0, 2);

        let results = {
            let events = manager.events();
            let mut events = std::pin::pin!(events);
            let mut results = None;
            while let Some(event) = events.next().await {
                if let DownloadEvent::SearchResult(entries) = event {
                    results = Some(entries);
                    break;
                }
            }
            results.unwrap()
        };
        assert_eq!(results.len(), 2);

        manager.install_entry(results[0].clone());
        manager.install_entry(Entry::default());
        loop {
            if let DownloadEvent::EntryStatusChanged(entry) = next(&mut manager).await
                && entry.status == Status::Installed
            {
                assert_eq!(entry.unique_id, "icon-0");
                break;
            }
        }
        manager.close().await.unwrap();
    }
}
