//! The Open Collaboration Services capability the OCS provider is built on.
//!
//! The wire protocol itself lives outside this crate: anything that can list
//! categories, page through contents, and resolve downloads can back an
//! [`OcsProvider`](super::OcsProvider).

use async_trait::async_trait;
use knewstuff_feed::models::{Author, DownloadLink};
use std::sync::Arc;
use time::Date;
use url::Url;

use crate::error::{ErrorKind, Result};

pub type OcsClientHandle = Arc<dyn OcsClient + Send + Sync>;

/// A known OCS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcsEndpoint {
    pub base_url: Url,
    pub name: String,
    pub icon: Option<String>,
    /// Whether the server offers the `content` service at all.
    pub has_content_service: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcsCategory {
    pub id: String,
    pub name: String,
}

/// Native sort orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcsSort {
    Newest,
    Alphabetical,
    Rating,
    Downloads,
}

/// One content item as reported by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcsContent {
    pub id: String,
    pub name: String,
    pub category: Option<OcsCategory>,
    pub version: String,
    pub updated: Option<Date>,
    pub created: Option<Date>,
    pub author: Author,
    pub summary: String,
    pub description: String,
    pub changelog: String,
    pub homepage: String,
    pub license: String,
    /// 0 to 100
    pub rating: Option<u32>,
    pub downloads: Option<u64>,
    pub fans: Option<u64>,
    pub donation_link: String,
    /// Up to three (small, big) preview URL pairs
    pub previews: Vec<(String, String)>,
    pub download_links: Vec<DownloadLink>,
}

/// A resolved download.
#[derive(Debug, Clone, PartialEq)]
pub struct OcsDownloadItem {
    pub url: String,
    pub price_amount: Option<f64>,
}

#[async_trait]
pub trait OcsClient: Send + Sync {
    /// Servers known without any configuration.
    async fn default_endpoints(&self) -> Result<Vec<OcsEndpoint>>;

    async fn categories(&self, endpoint: &Url) -> Result<Vec<OcsCategory>>;

    /// One page of contents. An empty category list means all categories.
    async fn search_contents(
        &self,
        endpoint: &Url,
        categories: &[OcsCategory],
        search_term: &str,
        sort: OcsSort,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<OcsContent>>;

    async fn content(&self, endpoint: &Url, id: &str) -> Result<OcsContent>;

    async fn vote(&self, endpoint: &Url, id: &str, rating: u32) -> Result<()>;

    async fn become_fan(&self, endpoint: &Url, id: &str) -> Result<()>;

    async fn download_link(&self, endpoint: &Url, id: &str, link_id: u32) -> Result<OcsDownloadItem>;

    async fn account_balance(&self, endpoint: &Url) -> Result<f64>;
}

/// User-facing error for an OCS status code.
pub fn status_error(provider: &str, status: u32, message: &str) -> ErrorKind {
    match status {
        200 => ErrorKind::Remote("Too many requests to server. Please try again in a few minutes.".to_string()),
        102 => ErrorKind::Remote(format!("The category is not recognized by {provider}.")),
        401 | 997 => ErrorKind::AuthenticationMissing(provider.to_string()),
        _ => ErrorKind::Remote(format!("Unknown Open Collaboration Service API error. ({status}: {message})")),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(200, "Too many requests to server. Please try again in a few minutes.")]
    #[case(102, "The category is not recognized by Example.")]
    #[case(999, "Unknown Open Collaboration Service API error. (999: boom)")]
    fn test_status_messages(#[case] status: u32, #[case] expected: &str) {
        assert_eq!(status_error("Example", status, "boom").to_string(), expected);
    }

    #[test]
    fn test_missing_credentials_status() {
        assert!(status_error("Example", 997, "").is_authentication());
    }
}
