use async_trait::async_trait;
use url::Url;

use super::Fetcher;
use crate::error::{ErrorKind, Result};

/// Reads `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn map_io_error(e: std::io::Error, url: &Url) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(url.to_string()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        if url.scheme() != "file" {
            exn::bail!(ErrorKind::Unsupported("non-file URL given to local fetcher"));
        }
        let Ok(path) = url.to_file_path() else {
            exn::bail!(ErrorKind::NotFound(url.to_string()));
        };
        tracing::debug!(path = %path.display(), "Reading local document");
        Ok(tokio::fs::read(&path).await.map_err(|e| Self::map_io_error(e, url))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, b"<knewstuff/>").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(LocalFetcher.fetch(&url).await.unwrap(), b"<knewstuff/>");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.xml")).unwrap();
        let err = LocalFetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_other_schemes() {
        let url = Url::parse("https://example.org/feed.xml").unwrap();
        let err = LocalFetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }
}
