use async_trait::async_trait;
use exn::ResultExt;
use std::time::Duration;
use url::Url;

use super::Fetcher;
use crate::error::{ErrorKind, Result};

const USER_AGENT: &str = concat!("knewstuff/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches `http://` and `https://` URLs.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}
impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::Network("failed to build HTTP client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        tracing::debug!(%url, "Fetching remote document");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("request to {url} failed")))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            exn::bail!(ErrorKind::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            exn::bail!(ErrorKind::AuthenticationMissing(url.to_string()));
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::Network(format!("{url} responded with {status}")));
        }
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed to read response body from {url}")))?;
        Ok(body.to_vec())
    }
}
