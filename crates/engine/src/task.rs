//! The engine task: sole owner of providers, cache and the current request.
//!
//! Commands arrive over a channel, provider work runs as futures in
//! [`EngineTask::pending`] and reports back as a [`Completion`]. Every state
//! change happens inside [`EngineTask::run`], one message at a time.

use exn::ResultExt;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use knewstuff_cache::{Cache, Flushed};
use knewstuff_config::Config;
use knewstuff_feed::models::{Entry, PreviewKind, ProviderDescriptor, ProviderKind, SearchRequest, SortMode, Status};
use knewstuff_feed::parse_provider_list;
use knewstuff_provider::error::{ErrorKind as ProviderErrorKind, Result as ProviderResult};
use knewstuff_provider::fetch::FetcherHandle;
use knewstuff_provider::ocs::{OcsClientHandle, OcsEndpoint};
use knewstuff_provider::{OcsProvider, ProviderHandle, StaticFeedProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::engine::{Command, EngineState, Snapshot};
use crate::error::{ErrorKind, Result};
use crate::event::{EngineEvent, Jobs};
use crate::installation::InstallationHandle;

/// Quiet period after the last search term change before a search is sent.
pub(crate) const SEARCH_DEBOUNCE: Duration = Duration::from_secs(1);

/// Why a search was dispatched.
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Browsing the current request. Completions from an older generation
    /// arrived after a reload and are only cached.
    Browse { generation: u64 },
    /// `check_for_updates` / `check_for_installed`
    Check,
}

enum Completion {
    DescriptorsLoaded { url: String, result: ProviderResult<Vec<u8>> },
    EndpointsLoaded(ProviderResult<Vec<OcsEndpoint>>),
    ProviderInitialized { provider_id: String, result: ProviderResult<()> },
    EntriesLoaded { provider_id: String, request: SearchRequest, origin: Origin, result: ProviderResult<Vec<Entry>> },
    DetailsLoaded(std::result::Result<Entry, String>),
    PreviewLoaded { entry: Entry, kind: PreviewKind, result: ProviderResult<Vec<u8>> },
    Installed { entry: Entry, previous: Status, result: std::result::Result<Entry, String> },
    Uninstalled { entry: Entry, result: std::result::Result<Entry, String> },
    Voted(std::result::Result<(), String>),
    BecameFan(std::result::Result<(), String>),
    Flushed(Flushed),
}

pub(crate) struct EngineTask {
    config: Config,
    cache: Cache,
    fetcher: FetcherHandle,
    ocs_client: Option<OcsClientHandle>,
    installation: InstallationHandle,
    /// Providers handed in by the owner, added before discovery starts.
    injected: Vec<ProviderHandle>,
    providers: BTreeMap<String, ProviderHandle>,
    state: EngineState,
    /// A provider list or OCS discovery is still outstanding.
    discovering: bool,
    request: SearchRequest,
    /// Highest page answered for the current request; `None` until one is.
    current_page: Option<u32>,
    generation: u64,
    jobs: Jobs,
    status: Option<String>,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
    debounce: Option<Instant>,
    flushing: bool,
    /// [`EngineEvent::ProvidersUnavailable`] has been sent.
    unavailable: bool,
    events: UnboundedSender<EngineEvent>,
}

impl EngineTask {
    pub(crate) fn new(
        config: Config,
        cache: Cache,
        fetcher: FetcherHandle,
        ocs_client: Option<OcsClientHandle>,
        installation: InstallationHandle,
        injected: Vec<ProviderHandle>,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        let request = SearchRequest::default().with_categories(config.categories.clone());
        Self {
            config,
            cache,
            fetcher,
            ocs_client,
            installation,
            injected,
            providers: BTreeMap::new(),
            state: EngineState::Uninitialized,
            discovering: false,
            request,
            current_page: None,
            generation: 0,
            jobs: Jobs::default(),
            status: None,
            pending: FuturesUnordered::new(),
            debounce: None,
            flushing: false,
            unavailable: false,
            events,
        }
    }

    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        self.start();
        self.update_status();
        let mut reply: Option<oneshot::Sender<Result<()>>> = None;
        loop {
            let debounce = self.debounce;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close(tx)) => {
                        reply = Some(tx);
                        break;
                    },
                    Some(command) => self.handle(command),
                    None => {
                        debug!("engine handle dropped");
                        break;
                    },
                },
                Some(completion) = self.pending.next(), if !self.pending.is_empty() => self.complete(completion),
                () = sleep_until(debounce.unwrap_or_else(Instant::now)), if debounce.is_some() => {
                    debug!(term = %self.request.search_term, "search term settled");
                    self.reload_entries();
                },
            }
            self.update_status();
        }

        let result = self.shutdown().await;
        if let Some(tx) = reply
            && tx.send(result).is_err()
        {
            trace!("close requested but nobody is waiting");
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }

    fn push(&mut self, future: impl Future<Output = Completion> + Send + 'static) {
        self.pending.push(future.boxed());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::RequestData { page, page_size } => self.request_data(page, page_size),
            Command::RequestMoreData => self.request_more_data(),
            Command::ReloadEntries => self.reload_entries(),
            Command::SetCategoriesFilter(categories) => {
                self.request.categories = categories;
                self.reload_entries();
            },
            Command::SetSortMode(sort_mode) => {
                self.request.sort_mode = sort_mode;
                self.reload_entries();
            },
            Command::SetSearchTerm(term) => self.set_search_term(term),
            Command::Install { entry, link_id } => self.install(entry, link_id),
            Command::Uninstall(entry) => self.uninstall(&entry),
            Command::CheckForUpdates => self.check(SortMode::Updates),
            Command::CheckForInstalled => self.check(SortMode::Installed),
            Command::LoadDetails(entry) => self.load_details(entry),
            Command::LoadPreview { entry, kind } => self.load_preview(entry, kind),
            Command::Vote { entry, rating } => self.vote(entry, rating),
            Command::BecomeFan(entry) => self.become_fan(entry),
            Command::Snapshot(tx) => {
                let snapshot = Snapshot {
                    state: self.state,
                    providers: self.providers.keys().cloned().collect(),
                    request: self.request.clone(),
                    current_page: self.current_page,
                    jobs: self.jobs,
                };
                if tx.send(snapshot).is_err() {
                    trace!("snapshot requested but nobody is waiting");
                }
            },
            // Intercepted by the run loop.
            Command::Close(_) => {},
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::DescriptorsLoaded { url, result } => self.descriptors_loaded(&url, result),
            Completion::EndpointsLoaded(result) => self.endpoints_loaded(result),
            Completion::ProviderInitialized { provider_id, result } => self.provider_initialized(provider_id, result),
            Completion::EntriesLoaded { provider_id, request, origin, result } => {
                self.jobs.data = self.jobs.data.saturating_sub(1);
                match result {
                    Ok(entries) => self.entries_loaded(request, origin, entries),
                    Err(err) => {
                        warn!(provider = %provider_id, %request, error = ?err, "loading entries failed");
                        self.report_provider_error(&provider_id, &err);
                        self.emit(EngineEvent::LoadingFailed { provider: provider_id, request });
                    },
                }
            },
            Completion::DetailsLoaded(result) => match result {
                Ok(entry) => self.emit(EngineEvent::DetailsLoaded(entry)),
                Err(message) => self.emit(EngineEvent::Error(message)),
            },
            Completion::PreviewLoaded { entry, kind, result } => {
                self.jobs.previews = self.jobs.previews.saturating_sub(1);
                match result {
                    Ok(data) => self.emit(EngineEvent::PreviewLoaded { entry, kind, data }),
                    Err(err) => warn!(entry = %entry.key(), ?kind, error = ?err, "preview could not be loaded"),
                }
            },
            Completion::Installed { entry, previous, result } => {
                self.jobs.installs = self.jobs.installs.saturating_sub(1);
                match result {
                    Ok(installed) => {
                        info!(entry = %installed.key(), version = %installed.version, "entry installed");
                        self.entry_changed(&installed);
                    },
                    Err(message) => {
                        let mut reverted = entry;
                        reverted.status = previous;
                        self.entry_changed(&reverted);
                        self.emit(EngineEvent::Error(message));
                    },
                }
            },
            Completion::Uninstalled { entry, result } => {
                self.jobs.installs = self.jobs.installs.saturating_sub(1);
                match result {
                    Ok(deleted) => {
                        info!(entry = %deleted.key(), "entry uninstalled");
                        self.entry_changed(&deleted);
                    },
                    Err(message) => {
                        self.entry_changed(&entry);
                        self.emit(EngineEvent::Error(message));
                    },
                }
            },
            Completion::Voted(result) => match result {
                Ok(()) => self.emit(EngineEvent::Information("Vote sent".to_string())),
                Err(message) => self.emit(EngineEvent::Error(message)),
            },
            Completion::BecameFan(result) => match result {
                Ok(()) => self.emit(EngineEvent::Information("You are now a fan.".to_string())),
                Err(message) => self.emit(EngineEvent::Error(message)),
            },
            Completion::Flushed(flushed) => {
                self.flushing = false;
                match &flushed.result {
                    Ok(applied) => debug!(upserted = applied.upserted, deleted = applied.deleted, "registry written"),
                    Err(err) => warn!(error = ?err, entries = flushed.entries.len(), "registry write failed"),
                }
                let succeeded = flushed.result.is_ok();
                self.cache.restore(&flushed);
                // A failed write is retried with the next change or on close.
                if succeeded {
                    self.flush();
                }
            },
        }
    }

    fn update_status(&mut self) {
        let status = self.jobs.status();
        if status == self.status {
            return;
        }
        self.status = status.clone();
        self.emit(match status {
            Some(message) => EngineEvent::Busy(message),
            None => EngineEvent::Idle,
        });
    }

    // =========================================================================
    // Providers
    // =========================================================================

    fn start(&mut self) {
        self.state = EngineState::Initializing;
        info!(app = self.cache.app(), registry = self.cache.registry_len(), "loading providers");
        for provider in std::mem::take(&mut self.injected) {
            self.add_provider(provider);
        }
        if let Some(url) = self.config.providers_url.clone() {
            self.discovering = true;
            self.jobs.data += 1;
            let fetcher = self.fetcher.clone();
            self.push(async move {
                let result = fetcher.fetch_str(&url).await;
                Completion::DescriptorsLoaded { url, result }
            });
        } else if let Some(client) = self.ocs_client.clone() {
            self.discovering = true;
            self.jobs.data += 1;
            self.push(async move { Completion::EndpointsLoaded(client.default_endpoints().await) });
        } else if self.providers.is_empty() {
            warn!("no provider list configured and no OCS discovery available");
            self.emit(EngineEvent::Error("No providers are configured.".to_string()));
        }
        self.check_ready();
    }

    fn descriptors_loaded(&mut self, url: &str, result: ProviderResult<Vec<u8>>) {
        self.jobs.data = self.jobs.data.saturating_sub(1);
        self.discovering = false;
        match result {
            Err(err) => {
                warn!(url, error = ?err, "provider list could not be fetched");
                self.emit(EngineEvent::Error(format!("Loading of providers from file: {url} failed")));
            },
            Ok(body) => match parse_provider_list(&body) {
                Err(err) => {
                    warn!(url, error = ?err, "provider list could not be parsed");
                    self.emit(EngineEvent::Error(format!(
                        "Could not load get hot new stuff providers from file: {url}"
                    )));
                },
                Ok(list) => {
                    debug!(url, count = list.providers.len(), "provider list loaded");
                    for (kind, descriptor) in list.iter() {
                        match self.build_provider(kind, descriptor) {
                            Ok(provider) => self.add_provider(provider),
                            Err(err) => {
                                warn!(%kind, error = ?err, "discarding provider");
                                self.emit(EngineEvent::Error("Error initializing provider.".to_string()));
                            },
                        }
                    }
                },
            },
        }
        self.check_ready();
    }

    fn build_provider(&self, kind: ProviderKind, descriptor: &ProviderDescriptor) -> ProviderResult<ProviderHandle> {
        let provider: ProviderHandle = match kind {
            ProviderKind::StaticFeed => Arc::new(StaticFeedProvider::from_descriptor(descriptor, self.fetcher.clone())?),
            ProviderKind::Ocs => {
                let Some(client) = &self.ocs_client else {
                    exn::bail!(ProviderErrorKind::Unsupported("OCS providers without an OCS client"));
                };
                Arc::new(OcsProvider::from_descriptor(descriptor, client.clone(), self.config.categories.clone())?)
            },
        };
        Ok(provider)
    }

    fn endpoints_loaded(&mut self, result: ProviderResult<Vec<OcsEndpoint>>) {
        self.jobs.data = self.jobs.data.saturating_sub(1);
        self.discovering = false;
        match (result, self.ocs_client.clone()) {
            (Ok(endpoints), Some(client)) => {
                for endpoint in endpoints {
                    if !endpoint.has_content_service {
                        debug!(endpoint = %endpoint.base_url, "skipping server without content service");
                        continue;
                    }
                    let provider = OcsProvider::from_endpoint(endpoint, client.clone(), self.config.categories.clone());
                    self.add_provider(Arc::new(provider));
                }
            },
            (Ok(_), None) => {},
            (Err(err), _) => {
                warn!(error = ?err, "OCS discovery failed");
                self.report_provider_error("ocs", &err);
            },
        }
        self.check_ready();
    }

    fn add_provider(&mut self, provider: ProviderHandle) {
        let provider_id = provider.id().to_string();
        if self.providers.contains_key(&provider_id) {
            debug!(provider = %provider_id, "provider already registered");
            return;
        }
        info!(provider = %provider_id, kind = %provider.kind(), name = provider.name(), "adding provider");
        self.providers.insert(provider_id.clone(), provider.clone());
        self.push(async move {
            let result = provider.initialize().await;
            Completion::ProviderInitialized { provider_id, result }
        });
    }

    fn provider_initialized(&mut self, provider_id: String, result: ProviderResult<()>) {
        match result {
            Ok(()) => {
                if let Some(provider) = self.providers.get(&provider_id) {
                    provider.set_cached_entries(self.cache.registry_for_provider(&provider_id));
                }
            },
            Err(err) => {
                warn!(provider = %provider_id, error = ?err, "provider failed to initialize");
                self.providers.remove(&provider_id);
                self.report_provider_error(&provider_id, &err);
            },
        }
        self.check_ready();
    }

    /// Ready once discovery is over and every remaining provider is
    /// initialized. Only ever fires once, as does the report that no provider
    /// survived.
    fn check_ready(&mut self) {
        if self.state == EngineState::Ready || self.discovering {
            return;
        }
        if self.providers.is_empty() {
            if !self.unavailable {
                self.unavailable = true;
                warn!("no usable providers left after discovery");
                self.emit(EngineEvent::ProvidersUnavailable);
            }
            return;
        }
        if !self.providers.values().all(|provider| provider.is_initialized()) {
            return;
        }
        self.state = EngineState::Ready;
        info!(providers = self.providers.len(), "all providers loaded");
        self.emit(EngineEvent::ProvidersLoaded);
    }

    fn report_provider_error(&self, provider_id: &str, err: &knewstuff_provider::error::Error) {
        if err.is_authentication() {
            self.emit(EngineEvent::AuthenticationMissing { provider: provider_id.to_string(), message: err.to_string() });
        } else {
            self.emit(EngineEvent::Error(err.to_string()));
        }
    }

    fn provider_for(&self, entry: &Entry) -> Option<ProviderHandle> {
        let provider = self.providers.get(&entry.provider_id).cloned();
        if provider.is_none() {
            warn!(entry = %entry.key(), "no provider for entry");
            self.emit(EngineEvent::Error(format!("No provider is available for \"{}\".", entry.name)));
        }
        provider
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn dispatch(&mut self, request: &SearchRequest, origin: Origin) {
        for provider in self.providers.values().filter(|provider| provider.is_initialized()) {
            self.jobs.data += 1;
            let provider = provider.clone();
            let request = request.clone();
            self.pending.push(
                async move {
                    let result = provider.load_entries(&request).await;
                    Completion::EntriesLoaded { provider_id: provider.id().to_string(), request, origin, result }
                }
                .boxed(),
            );
        }
    }

    fn request_data(&mut self, page: u32, page_size: u32) {
        self.request.page = page;
        self.request.page_size = page_size;
        let request = self.request.clone();
        self.dispatch(&request, Origin::Browse { generation: self.generation });
    }

    fn request_more_data(&mut self) {
        if self.current_page.is_none_or(|answered| answered < self.request.page) {
            debug!(page = self.request.page, answered = ?self.current_page, "current page not answered yet");
            return;
        }
        self.request.page += 1;
        let request = self.request.clone();
        self.dispatch(&request, Origin::Browse { generation: self.generation });
    }

    /// Start the current request over from the first page, answering from
    /// the request index where possible.
    fn reload_entries(&mut self) {
        self.debounce = None;
        self.emit(EngineEvent::ResetView);
        self.current_page = None;
        self.request.page = 0;
        self.generation += 1;
        let origin = Origin::Browse { generation: self.generation };

        if self.request.sort_mode == SortMode::Installed {
            let request = self.request.clone();
            self.dispatch(&request, origin);
            return;
        }

        loop {
            let cached = self.cache.request_from_cache(&self.request);
            if cached.is_empty() {
                break;
            }
            self.emit(EngineEvent::EntriesLoaded { request: self.request.clone(), entries: cached });
            self.current_page = Some(self.request.page);
            self.request.page += 1;
        }
        match self.current_page {
            Some(page) => self.request.page = page,
            None => {
                let request = self.request.clone();
                self.dispatch(&request, origin);
            },
        }
    }

    fn set_search_term(&mut self, term: String) {
        self.request.search_term = term;
        self.debounce = None;
        let first_page = self.request.clone().with_page(0);
        if self.cache.request_from_cache(&first_page).is_empty() {
            self.debounce = Some(Instant::now() + SEARCH_DEBOUNCE);
        } else {
            self.reload_entries();
        }
    }

    fn check(&mut self, sort_mode: SortMode) {
        let request = SearchRequest {
            sort_mode,
            categories: self.request.categories.clone(),
            page_size: self.request.page_size,
            ..SearchRequest::default()
        };
        self.dispatch(&request, Origin::Check);
    }

    fn entries_loaded(&mut self, request: SearchRequest, origin: Origin, entries: Vec<Entry>) {
        debug!(%request, count = entries.len(), ?origin, "entries loaded");
        let changed: Vec<Entry> = entries
            .iter()
            .filter(|entry| self.cache.registered(&entry.key()).is_some_and(|known| known.status != entry.status))
            .cloned()
            .collect();
        for entry in &changed {
            self.cache.register_changed_entry(entry);
        }
        self.flush();

        match origin {
            Origin::Check if request.sort_mode == SortMode::Updates => {
                self.emit(EngineEvent::UpdateableEntriesLoaded(entries));
            },
            Origin::Check => self.emit(EngineEvent::EntriesLoaded { request, entries }),
            Origin::Browse { generation } if generation != self.generation => {
                debug!(%request, "result of an earlier request, caching only");
                self.cache.insert_request(&request, &entries);
            },
            Origin::Browse { .. } => {
                self.current_page = Some(self.current_page.map_or(request.page, |page| page.max(request.page)));
                if request.sort_mode == SortMode::Updates {
                    self.emit(EngineEvent::UpdateableEntriesLoaded(entries));
                } else {
                    self.cache.insert_request(&request, &entries);
                    self.emit(EngineEvent::EntriesLoaded { request, entries });
                }
            },
        }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Record, announce and (for settled statuses) persist a changed entry.
    fn entry_changed(&mut self, entry: &Entry) {
        self.cache.register_changed_entry(entry);
        if let Some(provider) = self.providers.get(&entry.provider_id) {
            provider.update_cached_entry(entry.clone());
        }
        self.emit(EngineEvent::EntryChanged(entry.clone()));
        if !matches!(entry.status, Status::Installing | Status::Updating) {
            self.flush();
        }
    }

    fn install(&mut self, mut entry: Entry, link_id: u32) {
        let Some(provider) = self.provider_for(&entry) else {
            return;
        };
        let previous = entry.status;
        entry.status = if previous == Status::Updateable { Status::Updating } else { Status::Installing };
        self.entry_changed(&entry);
        self.jobs.installs += 1;
        let installation = self.installation.clone();
        self.push(async move {
            let result = match provider.load_payload_link(&entry, link_id).await {
                Ok(resolved) => installation.install(resolved).await.map_err(|err| {
                    warn!(entry = %entry.key(), error = ?err, "installation failed");
                    err.to_string()
                }),
                Err(err) => {
                    warn!(entry = %entry.key(), link_id, error = ?err, "payload link could not be resolved");
                    Err(err.to_string())
                },
            };
            Completion::Installed { entry, previous, result }
        });
    }

    fn uninstall(&mut self, entry: &Entry) {
        let Some(known) = self.cache.registered(&entry.key()).cloned() else {
            debug!(entry = %entry.key(), "entry is not in the registry, nothing to uninstall");
            return;
        };
        let mut working = known.clone();
        working.status = Status::Installing;
        self.entry_changed(&working);
        self.jobs.installs += 1;
        let installation = self.installation.clone();
        self.push(async move {
            let result = installation.uninstall(known.clone()).await.map_err(|err| {
                warn!(entry = %known.key(), error = ?err, "uninstall failed");
                err.to_string()
            });
            Completion::Uninstalled { entry: known, result }
        });
    }

    fn load_details(&mut self, entry: Entry) {
        let Some(provider) = self.provider_for(&entry) else {
            return;
        };
        self.push(async move {
            let result = provider.load_entry_details(&entry).await.map_err(|err| err.to_string());
            Completion::DetailsLoaded(result)
        });
    }

    fn load_preview(&mut self, entry: Entry, kind: PreviewKind) {
        let Some(url) = entry.preview(kind).map(str::to_string) else {
            debug!(entry = %entry.key(), ?kind, "entry has no such preview");
            return;
        };
        self.jobs.previews += 1;
        let fetcher = self.fetcher.clone();
        self.push(async move {
            let result = fetcher.fetch_str(&url).await;
            Completion::PreviewLoaded { entry, kind, result }
        });
    }

    fn vote(&mut self, entry: Entry, rating: u32) {
        let Some(provider) = self.provider_for(&entry) else {
            return;
        };
        if !provider.user_can_vote() {
            self.emit(EngineEvent::Error(format!("{} does not support voting.", provider.name())));
            return;
        }
        self.push(async move { Completion::Voted(provider.vote(&entry, rating).await.map_err(|err| err.to_string())) });
    }

    fn become_fan(&mut self, entry: Entry) {
        let Some(provider) = self.provider_for(&entry) else {
            return;
        };
        if !provider.user_can_become_fan() {
            self.emit(EngineEvent::Error(format!("{} does not support becoming a fan.", provider.name())));
            return;
        }
        self.push(async move { Completion::BecameFan(provider.become_fan(&entry).await.map_err(|err| err.to_string())) });
    }

    // =========================================================================
    // Registry
    // =========================================================================

    fn flush(&mut self) {
        if self.flushing || !self.cache.is_dirty() {
            return;
        }
        self.flushing = true;
        let flush = self.cache.flush();
        self.push(flush.map(Completion::Flushed));
    }

    /// Let running installs finish, then write and close the registry.
    async fn shutdown(mut self) -> Result<()> {
        self.debounce = None;
        while self.jobs.installs > 0 || self.flushing {
            let Some(completion) = self.pending.next().await else {
                break;
            };
            self.complete(completion);
            self.update_status();
        }
        let Self { cache, .. } = self;
        let applied = cache.close().await.or_raise(|| ErrorKind::Cache)?;
        info!(written = applied.total(), "engine closed");
        Ok(())
    }
}
