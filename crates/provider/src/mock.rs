//! In-memory provider for testing.

use async_trait::async_trait;
use knewstuff_feed::models::{Entry, ProviderKind, SearchRequest, SortMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use crate::cached::CachedEntries;
use crate::error::{ErrorKind, Result};
use crate::provider::Provider;

#[derive(Default)]
struct Calls {
    initialize: usize,
    load_entries: Vec<SearchRequest>,
    payload_links: Vec<(String, u32)>,
    votes: Vec<(String, u32)>,
    fans: Vec<String>,
}

/// In-memory provider for testing.
///
/// Serves a fixed remote listing, paginated by the request's page size and
/// reconciled against its cached entries like a real provider. Every call is
/// recorded. Behaves as an OCS provider (voting allowed) or a static feed
/// depending on its kind.
///
/// # Examples
///
/// ```
/// use knewstuff_feed::models::{Entry, SearchRequest};
/// use knewstuff_provider::{MockProvider, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = MockProvider::new("mock").with_listing([Entry::new("mock", "1")]);
/// provider.initialize().await.unwrap();
/// let entries = provider.load_entries(&SearchRequest::default()).await.unwrap();
/// assert_eq!(entries.len(), 1);
/// assert_eq!(provider.load_entries_calls().len(), 1);
/// # }
/// ```
pub struct MockProvider {
    id: String,
    name: String,
    kind: ProviderKind,
    listing: Vec<Entry>,
    init_gate: Option<Arc<Notify>>,
    fail_initialize: bool,
    load_delay: Option<Duration>,
    fail_loads: AtomicBool,
    authentication_missing: AtomicBool,
    initialized: AtomicBool,
    cache: CachedEntries,
    calls: Mutex<Calls>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: ProviderKind::StaticFeed,
            listing: Vec::new(),
            init_gate: None,
            fail_initialize: false,
            load_delay: None,
            fail_loads: AtomicBool::new(false),
            authentication_missing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            cache: CachedEntries::default(),
            calls: Mutex::default(),
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Entries the "server" lists. Their provider ID is overwritten with
    /// this provider's ID.
    pub fn with_listing(mut self, listing: impl IntoIterator<Item = Entry>) -> Self {
        self.listing = listing
            .into_iter()
            .map(|mut entry| {
                entry.provider_id = self.id.clone();
                entry
            })
            .collect();
        self
    }

    /// Hold initialization until the gate is notified.
    pub fn with_init_gate(mut self, gate: Arc<Notify>) -> Self {
        self.init_gate = Some(gate);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Delay every `load_entries` response.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Make subsequent `load_entries` calls fail with a network error.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    /// Make initialization and `load_entries` fail as if no credentials were
    /// configured.
    pub fn set_authentication_missing(&self, missing: bool) {
        self.authentication_missing.store(missing, Ordering::Release);
    }

    fn check_authentication(&self) -> Result<()> {
        if self.authentication_missing.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::AuthenticationMissing(self.id.clone()));
        }
        Ok(())
    }

    fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn initialize_calls(&self) -> usize {
        self.calls().initialize
    }

    pub fn load_entries_calls(&self) -> Vec<SearchRequest> {
        self.calls().load_entries.clone()
    }

    pub fn payload_link_calls(&self) -> Vec<(String, u32)> {
        self.calls().payload_links.clone()
    }

    pub fn votes(&self) -> Vec<(String, u32)> {
        self.calls().votes.clone()
    }

    pub fn fans(&self) -> Vec<String> {
        self.calls().fans.clone()
    }

    fn ensure_supported(&self, operation: &'static str) -> Result<()> {
        if self.kind != ProviderKind::Ocs {
            exn::bail!(ErrorKind::Unsupported(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<()> {
        self.calls().initialize += 1;
        if let Some(gate) = &self.init_gate {
            gate.notified().await;
        }
        if self.fail_initialize {
            exn::bail!(ErrorKind::Network(format!("{} is unreachable", self.id)));
        }
        self.check_authentication()?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn set_cached_entries(&self, entries: Vec<Entry>) {
        self.cache.replace(entries);
    }

    fn cached_entries(&self) -> Vec<Entry> {
        self.cache.snapshot()
    }

    fn update_cached_entry(&self, entry: Entry) {
        self.cache.upsert(entry);
    }

    async fn load_entries(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        self.calls().load_entries.push(request.clone());
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Network(format!("{} is unreachable", self.id)));
        }
        self.check_authentication()?;
        match request.sort_mode {
            SortMode::Installed | SortMode::Updates if request.page == 0 => {
                Ok(self.cache.filtered(|entry| request.includes(entry)))
            },
            SortMode::Installed | SortMode::Updates => Ok(Vec::new()),
            _ => {
                let start = (request.page as usize).saturating_mul(request.page_size as usize);
                let page: Vec<Entry> = self
                    .listing
                    .iter()
                    .filter(|entry| request.includes(entry))
                    .skip(start)
                    .take(request.page_size as usize)
                    .cloned()
                    .collect();
                Ok(self.cache.merge(page))
            },
        }
    }

    async fn load_entry_details(&self, entry: &Entry) -> Result<Entry> {
        let found = self.listing.iter().find(|listed| listed.is_same_item(entry));
        match found {
            Some(listed) => Ok(self.cache.merge(vec![listed.clone()]).pop().unwrap_or_else(|| entry.clone())),
            None => exn::bail!(ErrorKind::NotFound(entry.key().to_string())),
        }
    }

    async fn load_payload_link(&self, entry: &Entry, link_id: u32) -> Result<Entry> {
        self.calls().payload_links.push((entry.unique_id.clone(), link_id));
        let mut entry = entry.clone();
        if entry.payload.is_empty() {
            entry.payload = format!("mock://{}/{}", self.id, entry.unique_id);
        }
        Ok(entry)
    }

    fn user_can_vote(&self) -> bool {
        self.kind == ProviderKind::Ocs
    }

    async fn vote(&self, entry: &Entry, rating: u32) -> Result<()> {
        self.ensure_supported("voting")?;
        self.calls().votes.push((entry.unique_id.clone(), rating));
        Ok(())
    }

    fn user_can_become_fan(&self) -> bool {
        self.kind == ProviderKind::Ocs
    }

    async fn become_fan(&self, entry: &Entry) -> Result<()> {
        self.ensure_supported("becoming a fan")?;
        self.calls().fans.push(entry.unique_id.clone());
        Ok(())
    }
}
