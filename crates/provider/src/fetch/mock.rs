//! In-memory document transport for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use url::Url;

use super::Fetcher;
use crate::error::{ErrorKind, Result};

/// In-memory fetcher for testing.
///
/// Serves documents from a `HashMap` keyed by URL string, and counts every
/// request (including failed ones) so tests can assert on network traffic.
/// Unknown URLs fail with [`ErrorKind::NotFound`].
///
/// # Examples
///
/// ```
/// use knewstuff_provider::fetch::{Fetcher, MockFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = MockFetcher::with_documents([("https://example.org/feed.xml", "<knewstuff/>")]);
/// assert!(fetcher.fetch_str("https://example.org/feed.xml").await.is_ok());
/// assert_eq!(fetcher.calls("https://example.org/feed.xml").await, 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockFetcher {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    calls: RwLock<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn with_documents(documents: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let documents = documents.into_iter().map(|(url, body)| (url.into(), body.into())).collect();
        Self { documents: RwLock::new(documents), calls: RwLock::default() }
    }

    /// Add or replace a document.
    pub async fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.documents.write().await.insert(url.into(), body.into());
    }

    /// Remove a document, so later requests for it fail.
    pub async fn remove(&self, url: &str) {
        self.documents.write().await.remove(url);
    }

    /// Number of times `url` was requested.
    pub async fn calls(&self, url: &str) -> usize {
        self.calls.read().await.get(url).copied().unwrap_or_default()
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        *self.calls.write().await.entry(url.to_string()).or_default() += 1;
        match self.documents.read().await.get(url.as_str()) {
            Some(body) => Ok(body.clone()),
            None => exn::bail!(ErrorKind::NotFound(url.to_string())),
        }
    }
}
