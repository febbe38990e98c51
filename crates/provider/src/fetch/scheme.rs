use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

use super::{Fetcher, FetcherHandle};
use crate::error::{ErrorKind, Result};

/// Dispatches each URL to the fetcher registered for its scheme.
#[derive(Clone, Default)]
pub struct SchemeFetcher {
    fetchers: HashMap<String, FetcherHandle>,
}
impl SchemeFetcher {
    pub fn with(mut self, scheme: impl Into<String>, fetcher: FetcherHandle) -> Self {
        self.fetchers.insert(scheme.into(), fetcher);
        self
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    fn name(&self) -> &str {
        "scheme"
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let Some(fetcher) = self.fetchers.get(url.scheme()) else {
            tracing::warn!(scheme = url.scheme(), "No fetcher registered for scheme");
            exn::bail!(ErrorKind::Unsupported("URL scheme"));
        };
        fetcher.fetch(url).await
    }
}
