use async_trait::async_trait;
use exn::ResultExt;
use knewstuff_feed::models::{Entry, FeedSort, ProviderDescriptor, ProviderKind, SearchRequest, SortMode};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;
use url::Url;

use crate::cached::CachedEntries;
use crate::error::{ErrorKind, Result};
use crate::fetch::FetcherHandle;
use crate::provider::Provider;

/// Provider backed by fixed XML feed URLs, one per sort order.
///
/// Feeds are not paginated: the first page is the whole feed, and any later
/// page is empty. Update checks reconcile the latest feed against the
/// installed entries. Voting and becoming a fan are not supported.
pub struct StaticFeedProvider {
    id: String,
    name: String,
    icon: Option<String>,
    upload_url: Option<Url>,
    no_upload_url: Option<Url>,
    download_urls: BTreeMap<FeedSort, Url>,
    fetcher: FetcherHandle,
    initialized: AtomicBool,
    cache: CachedEntries,
}

impl StaticFeedProvider {
    /// Create an unconfigured provider. Call
    /// [`set_descriptor()`](Self::set_descriptor) before sharing it.
    pub fn new(fetcher: FetcherHandle) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            icon: None,
            upload_url: None,
            no_upload_url: None,
            download_urls: BTreeMap::new(),
            fetcher,
            initialized: AtomicBool::new(false),
            cache: CachedEntries::default(),
        }
    }

    pub fn from_descriptor(descriptor: &ProviderDescriptor, fetcher: FetcherHandle) -> Result<Self> {
        let mut provider = Self::new(fetcher);
        provider.set_descriptor(descriptor)?;
        Ok(provider)
    }

    /// Read name, upload URL, per-sort download URLs and icon from a provider
    /// description.
    ///
    /// Exactly one of `uploadurl`/`nouploadurl` must be present, and at least
    /// one download URL. On failure the provider is left unchanged.
    pub fn set_descriptor(&mut self, descriptor: &ProviderDescriptor) -> Result<()> {
        let upload_url = descriptor.upload_url.as_deref().map(|u| parse_url("uploadurl", u)).transpose()?;
        let no_upload_url = descriptor.no_upload_url.as_deref().map(|u| parse_url("nouploadurl", u)).transpose()?;
        match (&upload_url, &no_upload_url) {
            (Some(_), Some(_)) => {
                exn::bail!(ErrorKind::InvalidDescriptor("both uploadurl and nouploadurl are set".to_string()))
            },
            (None, None) => exn::bail!(ErrorKind::InvalidDescriptor("neither uploadurl nor nouploadurl is set".to_string())),
            _ => {},
        }

        let download_urls = descriptor
            .download_urls
            .iter()
            .map(|(sort, url)| Ok((*sort, parse_url(sort.attribute(), url)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let Some(id) = download_urls.get(&FeedSort::Default).or_else(|| download_urls.values().next()) else {
            exn::bail!(ErrorKind::InvalidDescriptor("no download URL".to_string()));
        };

        self.id = id.to_string();
        self.name = descriptor.title.clone().unwrap_or_else(|| self.id.clone());
        self.icon = descriptor.icon.clone();
        self.upload_url = upload_url;
        self.no_upload_url = no_upload_url;
        self.download_urls = download_urls;
        tracing::debug!(provider = %self.id, name = %self.name, "Configured static feed provider");
        Ok(())
    }

    pub fn upload_url(&self) -> Option<&Url> {
        self.upload_url.as_ref()
    }

    pub fn no_upload_url(&self) -> Option<&Url> {
        self.no_upload_url.as_ref()
    }

    /// Feed URL for a sort mode, falling back to the default feed.
    fn download_url(&self, sort_mode: SortMode) -> Option<&Url> {
        let sort = match sort_mode {
            SortMode::Rating | SortMode::Installed => FeedSort::Score,
            SortMode::Alphabetical => FeedSort::Default,
            SortMode::Newest | SortMode::Updates => FeedSort::Latest,
            SortMode::Downloads => FeedSort::Downloads,
        };
        self.download_urls.get(&sort).or_else(|| self.download_urls.get(&FeedSort::Default))
    }
}

fn parse_url(field: &str, url: &str) -> Result<Url> {
    Url::parse(url).or_raise(|| ErrorKind::InvalidDescriptor(format!("{field} is not a valid URL: {url}")))
}

#[async_trait]
impl Provider for StaticFeedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::StaticFeed
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<()> {
        if self.id.is_empty() {
            exn::bail!(ErrorKind::InvalidDescriptor("provider has not been configured".to_string()));
        }
        self.initialized.store(true, Ordering::Release);
        tracing::info!(provider = %self.id, "Static feed provider initialized");
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
        if !self.is_initialized() {
            exn::bail!(ErrorKind::NotInitialized);
        }
        if request.page > 0 {
            return Ok(Vec::new());
        }
        if request.sort_mode == SortMode::Installed {
            return Ok(self.cache.filtered(|entry| request.includes(entry)));
        }

        let Some(url) = self.download_url(request.sort_mode) else {
            exn::bail!(ErrorKind::NotFound(format!("no feed for sort order {}", request.sort_mode)));
        };
        let body = self.fetcher.fetch(url).await?;
        let listing = knewstuff_feed::parse_feed(&body, &self.id)
            .or_raise(|| ErrorKind::Parse(format!("invalid feed document at {url}")))?;
        let entries: Vec<Entry> = self.cache.merge(listing).into_iter().filter(|e| request.includes(e)).collect();
        tracing::debug!(count = entries.len(), "Loaded static feed");
        Ok(entries)
    }

    async fn load_entry_details(&self, entry: &Entry) -> Result<Entry> {
        // Feeds carry every field up front.
        Ok(self.cache.find(entry).unwrap_or_else(|| entry.clone()))
    }

    async fn load_payload_link(&self, entry: &Entry, _link_id: u32) -> Result<Entry> {
        if entry.payload.is_empty() {
            exn::bail!(ErrorKind::NotFound(format!("{} has no payload", entry.name)));
        }
        Ok(entry.clone())
    }
}
