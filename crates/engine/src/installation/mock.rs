//! In-memory installation for testing.

use async_trait::async_trait;
use knewstuff_feed::models::{Entry, Status};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Installation;
use crate::error::{ErrorKind, Result};

/// Installation that never touches the filesystem.
///
/// Installs record a single fake file per entry. Every call is recorded, and
/// the whole installation can be switched to fail.
#[derive(Default)]
pub struct MockInstallation {
    fail: AtomicBool,
    installs: Mutex<Vec<Entry>>,
    uninstalls: Mutex<Vec<Entry>>,
}

impl MockInstallation {
    pub fn failing() -> Self {
        let installation = Self::default();
        installation.set_fail(true);
        installation
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    fn lock(calls: &Mutex<Vec<Entry>>) -> MutexGuard<'_, Vec<Entry>> {
        calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entries passed to `install`, as they were passed.
    pub fn installs(&self) -> Vec<Entry> {
        Self::lock(&self.installs).clone()
    }

    pub fn uninstalls(&self) -> Vec<Entry> {
        Self::lock(&self.uninstalls).clone()
    }

    fn check(&self, entry: &Entry) -> Result<()> {
        if self.fail.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Download(entry.payload.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Installation for MockInstallation {
    async fn install(&self, mut entry: Entry) -> Result<Entry> {
        Self::lock(&self.installs).push(entry.clone());
        self.check(&entry)?;
        if entry.status == Status::Updating {
            entry.promote_update();
        }
        entry.installed_files = vec![format!("/mock/{}", entry.unique_id)];
        entry.status = Status::Installed;
        Ok(entry)
    }

    async fn uninstall(&self, mut entry: Entry) -> Result<Entry> {
        Self::lock(&self.uninstalls).push(entry.clone());
        self.check(&entry)?;
        entry.installed_files.clear();
        entry.status = Status::Deleted;
        Ok(entry)
    }
}
