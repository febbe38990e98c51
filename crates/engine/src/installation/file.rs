use async_trait::async_trait;
use exn::ResultExt;
use knewstuff_feed::models::{Entry, Status};
use knewstuff_provider::fetch::FetcherHandle;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};
use url::Url;

use super::Installation;
use super::path::{is_within, validate};
use crate::error::{ErrorKind, Result};

/// Installs payloads as plain files inside a single directory.
///
/// The payload is downloaded through a [`Fetcher`](knewstuff_provider::fetch::Fetcher)
/// and stored under the last segment of its URL. Uninstalling only ever
/// deletes recorded files that live inside the install root.
#[derive(Clone)]
pub struct FileInstallation {
    root: PathBuf,
    fetcher: FetcherHandle,
}

impl FileInstallation {
    /// # Errors
    ///
    /// Returns an error if `root` is not absolute.
    pub fn new(root: impl AsRef<Path>, fetcher: FetcherHandle) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { root, fetcher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name to store a payload under: the last URL segment, falling back
    /// to the entry's unique ID.
    fn file_name(url: &Url, entry: &Entry) -> Result<PathBuf> {
        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        let name = segment.unwrap_or_else(|| entry.unique_id.clone());
        let validated = validate(&name)?;
        // A single file directly inside the root, never a nested path.
        match validated.file_name() {
            Some(file_name) => Ok(PathBuf::from(file_name)),
            None => exn::bail!(ErrorKind::InvalidPath(validated)),
        }
    }

    async fn remove_files(&self, files: &[String]) -> Result<()> {
        for file in files {
            let path = Path::new(file);
            if !is_within(&self.root, path) {
                warn!(file, root = %self.root.display(), "not removing file outside of install root");
                continue;
            }
            match fs::remove_file(path).await {
                Ok(()) => debug!(file, "removed installed file"),
                Err(e) if e.kind() == IoErrorKind::NotFound => debug!(file, "installed file already gone"),
                Err(e) => exn::bail!(ErrorKind::Io(e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Installation for FileInstallation {
    #[instrument(skip_all, fields(entry = %entry.key()))]
    async fn install(&self, mut entry: Entry) -> Result<Entry> {
        let url = Url::parse(&entry.payload).or_raise(|| ErrorKind::InvalidPayload(entry.payload.clone()))?;
        let target = self.root.join(Self::file_name(&url, &entry)?);
        let data = self.fetcher.fetch(&url).await.or_raise(|| ErrorKind::Download(url.to_string()))?;

        // Files of the version being replaced.
        let previous: Vec<String> =
            entry.installed_files.iter().filter(|file| Path::new(file.as_str()) != target).cloned().collect();
        self.remove_files(&previous).await?;

        fs::create_dir_all(&self.root).await.map_err(ErrorKind::Io)?;
        fs::write(&target, data).await.map_err(ErrorKind::Io)?;
        debug!(path = %target.display(), "payload installed");

        if entry.status == Status::Updating {
            entry.promote_update();
        }
        entry.installed_files = vec![target.to_string_lossy().into_owned()];
        entry.status = Status::Installed;
        Ok(entry)
    }

    #[instrument(skip_all, fields(entry = %entry.key()))]
    async fn uninstall(&self, mut entry: Entry) -> Result<Entry> {
        self.remove_files(&entry.installed_files).await?;
        entry.installed_files.clear();
        entry.status = Status::Deleted;
        Ok(entry)
    }
}
