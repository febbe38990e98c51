//! In-memory OCS server for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use url::Url;

use super::client::{OcsCategory, OcsClient, OcsContent, OcsDownloadItem, OcsEndpoint, OcsSort, status_error};
use crate::error::{ErrorKind, Result};

#[derive(Default)]
struct State {
    balance: f64,
    failure: Option<u32>,
    votes: Vec<(String, u32)>,
    fans: Vec<String>,
    requests: HashMap<&'static str, usize>,
}

/// In-memory OCS server for testing.
///
/// Serves a fixed set of categories and contents for a single endpoint, and
/// records votes, fan requests and per-operation request counts.
pub struct MockOcsClient {
    endpoint: OcsEndpoint,
    categories: Vec<OcsCategory>,
    contents: Vec<OcsContent>,
    extra_endpoints: Vec<OcsEndpoint>,
    state: RwLock<State>,
}

impl MockOcsClient {
    /// Panics if `base_url` is not a valid URL. If test setup is wrong, then
    /// the test should not pass.
    pub fn new(base_url: &str) -> Self {
        let Ok(base_url) = Url::parse(base_url) else {
            panic!("MockOcsClient::new: invalid base URL {base_url}");
        };
        Self {
            endpoint: OcsEndpoint { name: "mock".to_string(), base_url, icon: None, has_content_service: true },
            categories: Vec::new(),
            contents: Vec::new(),
            extra_endpoints: Vec::new(),
            state: RwLock::default(),
        }
    }

    pub fn with_categories<'a>(mut self, categories: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.categories = categories
            .into_iter()
            .map(|(id, name)| OcsCategory { id: id.to_string(), name: name.to_string() })
            .collect();
        self
    }

    pub fn with_contents(mut self, contents: impl IntoIterator<Item = OcsContent>) -> Self {
        self.contents = contents.into_iter().collect();
        self
    }

    /// Also report `endpoint` from default discovery.
    pub fn with_endpoint(mut self, endpoint: OcsEndpoint) -> Self {
        self.extra_endpoints.push(endpoint);
        self
    }

    pub fn endpoint(&self) -> &OcsEndpoint {
        &self.endpoint
    }

    /// Make every following request fail with an OCS status code.
    pub async fn fail_with(&self, status: u32) {
        self.state.write().await.failure = Some(status);
    }

    pub async fn set_balance(&self, balance: f64) {
        self.state.write().await.balance = balance;
    }

    pub async fn votes(&self) -> Vec<(String, u32)> {
        self.state.read().await.votes.clone()
    }

    pub async fn fans(&self) -> Vec<String> {
        self.state.read().await.fans.clone()
    }

    pub async fn search_requests(&self) -> usize {
        self.requests("search").await
    }

    pub async fn content_requests(&self) -> usize {
        self.requests("content").await
    }

    async fn requests(&self, operation: &'static str) -> usize {
        self.state.read().await.requests.get(operation).copied().unwrap_or_default()
    }

    async fn begin(&self, operation: &'static str, endpoint: &Url) -> Result<()> {
        let mut state = self.state.write().await;
        *state.requests.entry(operation).or_default() += 1;
        if let Some(status) = state.failure {
            exn::bail!(status_error(&self.endpoint.name, status, operation));
        }
        if endpoint != &self.endpoint.base_url {
            exn::bail!(ErrorKind::Network(format!("unknown endpoint {endpoint}")));
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Result<&OcsContent> {
        match self.contents.iter().find(|c| c.id == id) {
            Some(content) => Ok(content),
            None => exn::bail!(ErrorKind::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl OcsClient for MockOcsClient {
    async fn default_endpoints(&self) -> Result<Vec<OcsEndpoint>> {
        let mut endpoints = vec![self.endpoint.clone()];
        endpoints.extend(self.extra_endpoints.iter().cloned());
        Ok(endpoints)
    }

    async fn categories(&self, endpoint: &Url) -> Result<Vec<OcsCategory>> {
        self.begin("categories", endpoint).await?;
        Ok(self.categories.clone())
    }

    async fn search_contents(
        &self,
        endpoint: &Url,
        categories: &[OcsCategory],
        search_term: &str,
        sort: OcsSort,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<OcsContent>> {
        self.begin("search", endpoint).await?;
        let term = search_term.to_lowercase();
        let mut matches: Vec<OcsContent> = self
            .contents
            .iter()
            .filter(|c| categories.is_empty() || c.category.as_ref().is_some_and(|cat| categories.contains(cat)))
            .filter(|c| term.is_empty() || c.name.to_lowercase().contains(&term))
            .cloned()
            .collect();
        match sort {
            OcsSort::Newest => matches.sort_by(|a, b| b.updated.cmp(&a.updated)),
            OcsSort::Alphabetical => matches.sort_by(|a, b| a.name.cmp(&b.name)),
            OcsSort::Rating => matches.sort_by(|a, b| b.rating.cmp(&a.rating)),
            OcsSort::Downloads => matches.sort_by(|a, b| b.downloads.cmp(&a.downloads)),
        }
        let start = (page as usize).saturating_mul(page_size as usize);
        Ok(matches.into_iter().skip(start).take(page_size as usize).collect())
    }

    async fn content(&self, endpoint: &Url, id: &str) -> Result<OcsContent> {
        self.begin("content", endpoint).await?;
        self.find(id).cloned()
    }

    async fn vote(&self, endpoint: &Url, id: &str, rating: u32) -> Result<()> {
        self.begin("vote", endpoint).await?;
        self.find(id)?;
        self.state.write().await.votes.push((id.to_string(), rating));
        Ok(())
    }

    async fn become_fan(&self, endpoint: &Url, id: &str) -> Result<()> {
        self.begin("fan", endpoint).await?;
        self.find(id)?;
        self.state.write().await.fans.push(id.to_string());
        Ok(())
    }

    async fn download_link(&self, endpoint: &Url, id: &str, link_id: u32) -> Result<OcsDownloadItem> {
        self.begin("download", endpoint).await?;
        let content = self.find(id)?;
        let price_amount = content.download_links.iter().find(|link| link.id == link_id).and_then(|l| l.price_amount);
        Ok(OcsDownloadItem { url: format!("{endpoint}content/download/{id}/{link_id}"), price_amount })
    }

    async fn account_balance(&self, endpoint: &Url) -> Result<f64> {
        self.begin("balance", endpoint).await?;
        Ok(self.state.read().await.balance)
    }
}
