mod client;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::client::{
    OcsCategory, OcsClient, OcsClientHandle, OcsContent, OcsDownloadItem, OcsEndpoint, OcsSort, status_error,
};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockOcsClient;

use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::stream::{FuturesUnordered, StreamExt};
use knewstuff_feed::models::{
    Entry, FeedSort, PreviewKind, ProviderDescriptor, ProviderKind, SearchRequest, SortMode, Source, Status,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::instrument;
use url::Url;

use crate::cached::CachedEntries;
use crate::error::{ErrorKind, Result};
use crate::provider::Provider;

/// Provider backed by an Open Collaboration Services server.
///
/// Category names from the application configuration are mapped to the
/// server's categories during initialization; the provider only becomes
/// initialized once that mapping is known.
pub struct OcsProvider {
    endpoint: Option<OcsEndpoint>,
    id: String,
    client: OcsClientHandle,
    category_names: Vec<String>,
    categories: Mutex<Vec<OcsCategory>>,
    initialized: AtomicBool,
    cache: CachedEntries,
}

impl OcsProvider {
    /// Create an unconfigured provider. Call
    /// [`set_descriptor()`](Self::set_descriptor) before sharing it.
    pub fn new(client: OcsClientHandle, category_names: Vec<String>) -> Self {
        Self {
            endpoint: None,
            id: String::new(),
            client,
            category_names,
            categories: Mutex::default(),
            initialized: AtomicBool::new(false),
            cache: CachedEntries::default(),
        }
    }

    /// Provider for a server found through default discovery.
    pub fn from_endpoint(endpoint: OcsEndpoint, client: OcsClientHandle, category_names: Vec<String>) -> Self {
        let mut provider = Self::new(client, category_names);
        provider.id = endpoint.base_url.to_string();
        provider.endpoint = Some(endpoint);
        provider
    }

    pub fn from_descriptor(
        descriptor: &ProviderDescriptor,
        client: OcsClientHandle,
        category_names: Vec<String>,
    ) -> Result<Self> {
        let mut provider = Self::new(client, category_names);
        provider.set_descriptor(descriptor)?;
        Ok(provider)
    }

    /// Read the server location, name and icon from a provider description.
    ///
    /// The base URL comes from the `location` child, or the `downloadurl`
    /// attribute for generic provider lists.
    pub fn set_descriptor(&mut self, descriptor: &ProviderDescriptor) -> Result<()> {
        if descriptor.upload_url.is_some() && descriptor.no_upload_url.is_some() {
            exn::bail!(ErrorKind::InvalidDescriptor("both uploadurl and nouploadurl are set".to_string()));
        }
        let Some(location) = descriptor.location.as_deref().or_else(|| descriptor.download_url(FeedSort::Default))
        else {
            exn::bail!(ErrorKind::InvalidDescriptor("no server location".to_string()));
        };
        let base_url = Url::parse(location)
            .or_raise(|| ErrorKind::InvalidDescriptor(format!("location is not a valid URL: {location}")))?;
        if !descriptor.services.is_empty() && !descriptor.has_service("content") {
            exn::bail!(ErrorKind::InvalidDescriptor(format!("{base_url} does not offer the content service")));
        }
        let name = descriptor.name.clone().or_else(|| descriptor.title.clone()).unwrap_or_else(|| base_url.to_string());
        self.id = base_url.to_string();
        self.endpoint =
            Some(OcsEndpoint { base_url, name, icon: descriptor.icon.clone(), has_content_service: true });
        tracing::debug!(provider = %self.id, "Configured OCS provider");
        Ok(())
    }

    fn endpoint(&self) -> Result<&OcsEndpoint> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint),
            None => exn::bail!(ErrorKind::InvalidDescriptor("provider has not been configured".to_string())),
        }
    }

    fn base_url(&self) -> Result<&Url> {
        Ok(&self.endpoint()?.base_url)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            exn::bail!(ErrorKind::NotInitialized);
        }
        Ok(())
    }

    /// Server categories matching the request filter, or every mapped
    /// category when the request has none.
    fn request_categories(&self, request: &SearchRequest) -> Vec<OcsCategory> {
        let categories = self.categories.lock().unwrap_or_else(PoisonError::into_inner);
        if request.categories.is_empty() {
            return categories.clone();
        }
        categories
            .iter()
            .filter(|category| request.categories.iter().any(|name| name.eq_ignore_ascii_case(&category.name)))
            .cloned()
            .collect()
    }

    fn entry_from_content(&self, content: OcsContent) -> Entry {
        let mut entry = Entry::new(&self.id, content.id);
        entry.name = content.name;
        entry.category = content.category.map(|c| c.name).unwrap_or_default();
        entry.version = content.version;
        entry.release_date = content.updated.or(content.created);
        entry.author = content.author;
        entry.short_summary = content.summary;
        entry.summary = content.description;
        entry.changelog = content.changelog;
        entry.homepage = content.homepage;
        entry.license = content.license;
        entry.rating = content.rating;
        entry.downloads = content.downloads;
        entry.fans = content.fans;
        entry.donation_link = content.donation_link;
        for (index, (small, big)) in content.previews.into_iter().enumerate() {
            if let Some(kind) = PreviewKind::small(index + 1) {
                entry.previews.insert(kind, small);
            }
            if let Some(kind) = PreviewKind::big(index + 1) {
                entry.previews.insert(kind, big);
            }
        }
        entry.download_links = content.download_links;
        entry.status = Status::Downloadable;
        entry.source = Source::Online;
        entry
    }

    /// Re-fetch every installed entry and report those with a newer version.
    async fn load_updates(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        let base_url = self.base_url()?;
        let installed = self.cache.filtered(|entry| entry.status.is_installed());
        let mut pending: FuturesUnordered<_> = installed
            .iter()
            .map(|entry| async move { (entry, self.client.content(base_url, &entry.unique_id).await) })
            .collect();
        let mut listing = Vec::with_capacity(installed.len());
        while let Some((entry, result)) = pending.next().await {
            match result {
                Ok(content) => listing.push(self.entry_from_content(content)),
                Err(err) => tracing::warn!(entry = %entry.key(), error = %err, "Failed to check entry for updates"),
            }
        }
        Ok(self.cache.merge(listing).into_iter().filter(|e| request.includes(e)).collect())
    }
}

fn native_sort(sort_mode: SortMode) -> OcsSort {
    match sort_mode {
        SortMode::Newest => OcsSort::Newest,
        SortMode::Alphabetical => OcsSort::Alphabetical,
        SortMode::Downloads => OcsSort::Downloads,
        _ => OcsSort::Rating,
    }
}

#[async_trait]
impl Provider for OcsProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        self.endpoint.as_ref().map(|e| e.name.as_str()).unwrap_or_default()
    }

    fn icon(&self) -> Option<&str> {
        self.endpoint.as_ref().and_then(|e| e.icon.as_deref())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ocs
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[instrument(skip(self), fields(provider = %self.id))]
    async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let remote = self.client.categories(self.base_url()?).await?;
        let mapped: Vec<OcsCategory> = self
            .category_names
            .iter()
            .filter_map(|name| {
                let found = remote.iter().find(|c| c.name.eq_ignore_ascii_case(name)).cloned();
                if found.is_none() {
                    tracing::warn!(category = %name, "Category not offered by server");
                }
                found
            })
            .collect();
        tracing::info!(categories = mapped.len(), "OCS provider initialized");
        *self.categories.lock().unwrap_or_else(PoisonError::into_inner) = mapped;
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

    #[instrument(skip(self), fields(provider = %self.id, sort = %request.sort_mode, page = request.page))]
    async fn load_entries(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        self.ensure_initialized()?;
        match request.sort_mode {
            SortMode::Installed if request.page == 0 => Ok(self.cache.filtered(|entry| request.includes(entry))),
            SortMode::Installed => Ok(Vec::new()),
            SortMode::Updates => self.load_updates(request).await,
            sort_mode => {
                let contents = self
                    .client
                    .search_contents(
                        self.base_url()?,
                        &self.request_categories(request),
                        &request.search_term,
                        native_sort(sort_mode),
                        request.page,
                        request.page_size,
                    )
                    .await?;
                let listing = contents.into_iter().map(|content| self.entry_from_content(content)).collect();
                let entries = self.cache.merge(listing);
                tracing::debug!(count = entries.len(), "Loaded OCS contents");
                Ok(entries)
            },
        }
    }

    async fn load_entry_details(&self, entry: &Entry) -> Result<Entry> {
        self.ensure_initialized()?;
        let content = self.client.content(self.base_url()?, &entry.unique_id).await?;
        let mut merged = self.cache.merge(vec![self.entry_from_content(content)]);
        merged.pop().ok_or_raise(|| ErrorKind::NotFound(entry.key().to_string()))
    }

    #[instrument(skip(self, entry), fields(provider = %self.id, entry = %entry.unique_id))]
    async fn load_payload_link(&self, entry: &Entry, link_id: u32) -> Result<Entry> {
        self.ensure_initialized()?;
        let base_url = self.base_url()?;
        let price = entry.download_links.iter().find(|link| link.id == link_id).and_then(|link| {
            if link.is_priced() { link.price_amount } else { None }
        });
        if let Some(price) = price {
            let balance = self.client.account_balance(base_url).await?;
            tracing::info!(price, balance, "Download requires payment");
            if balance < price {
                exn::bail!(ErrorKind::InsufficientBalance { balance, price });
            }
        }
        let item = self.client.download_link(base_url, &entry.unique_id, link_id).await?;
        let mut entry = entry.clone();
        entry.payload = item.url;
        self.cache.upsert(entry.clone());
        Ok(entry)
    }

    fn user_can_vote(&self) -> bool {
        true
    }

    async fn vote(&self, entry: &Entry, rating: u32) -> Result<()> {
        self.ensure_initialized()?;
        self.client.vote(self.base_url()?, &entry.unique_id, rating.min(100)).await
    }

    fn user_can_become_fan(&self) -> bool {
        true
    }

    async fn become_fan(&self, entry: &Entry) -> Result<()> {
        self.ensure_initialized()?;
        self.client.become_fan(self.base_url()?, &entry.unique_id).await
    }
}
