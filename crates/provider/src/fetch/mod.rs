//! Document transport.
//!
//! Providers never talk to the network directly; they hand a URL to a
//! [`Fetcher`] and get the raw bytes back. This keeps the providers testable
//! and lets the same provider code read feeds from disk or over HTTP.

#[cfg(feature = "http")]
mod http;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod scheme;

#[cfg(feature = "http")]
pub use self::http::HttpFetcher;
pub use self::local::LocalFetcher;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockFetcher;
pub use self::scheme::SchemeFetcher;

use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;
use url::Url;

use crate::error::{ErrorKind, Result};

pub type FetcherHandle = Arc<dyn Fetcher + Send + Sync>;

/// Fetches whole documents by URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of the transport, for logging only.
    fn name(&self) -> &str;

    /// Fetch the full body behind `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;

    /// Parse `url` and fetch it.
    async fn fetch_str(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).or_raise(|| ErrorKind::NotFound(url.to_string()))?;
        self.fetch(&parsed).await
    }
}

/// The default transport: `file://` from disk, `http(s)://` over the network
/// when the `http` feature is enabled.
pub fn default_fetcher() -> Result<FetcherHandle> {
    let scheme = SchemeFetcher::default().with("file", Arc::new(LocalFetcher));
    #[cfg(feature = "http")]
    let scheme = {
        let http: FetcherHandle = Arc::new(HttpFetcher::new()?);
        scheme.with("http", http.clone()).with("https", http)
    };
    Ok(Arc::new(scheme))
}
