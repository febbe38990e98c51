//! Putting payloads on disk and taking them off again.
//!
//! The engine only decides *when* to install or uninstall an entry; an
//! [`Installation`] decides *how*. Both operations take the entry by value and
//! hand back its new state: an install returns the entry as
//! [`Installed`](knewstuff_feed::models::Status::Installed) with its
//! installed files recorded, an uninstall returns it as
//! [`Deleted`](knewstuff_feed::models::Status::Deleted).

mod file;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod path;

pub use self::file::FileInstallation;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockInstallation;

use async_trait::async_trait;
use knewstuff_feed::models::Entry;
use std::sync::Arc;

use crate::error::Result;

pub type InstallationHandle = Arc<dyn Installation + Send + Sync>;

#[async_trait]
pub trait Installation: Send + Sync {
    /// Download the entry's payload (already resolved to a concrete link) and
    /// install it.
    async fn install(&self, entry: Entry) -> Result<Entry>;

    /// Remove every file recorded for the entry.
    async fn uninstall(&self, entry: Entry) -> Result<Entry>;
}
