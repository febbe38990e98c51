use async_trait::async_trait;
use knewstuff_feed::models::{Entry, ProviderKind, SearchRequest};

use crate::error::{ErrorKind, Result};

/// A source of entries.
///
/// Providers are configured from a descriptor before they are shared, then
/// become ready through [`initialize()`](Self::initialize). Every network
/// operation is asynchronous; each call resolves exactly once, to either the
/// result or an error. There is no cancellation: callers that lose interest in
/// a result simply ignore it.
///
/// # Cached entries
///
/// Each provider keeps its own running list of entries it has seen, seeded
/// from the persisted registry via [`set_cached_entries()`](Self::set_cached_entries).
/// Listings are reconciled against that list so that locally installed
/// entries keep (or update) their status.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, derived from the provider's canonical URL.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    fn icon(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> ProviderKind;

    /// Whether [`initialize()`](Self::initialize) has completed successfully.
    fn is_initialized(&self) -> bool;

    /// Prepare the provider for use. Calling it again once initialized is a
    /// no-op.
    async fn initialize(&self) -> Result<()>;

    /// Replace the running list of known entries.
    fn set_cached_entries(&self, entries: Vec<Entry>);

    /// Snapshot of the running list of known entries.
    fn cached_entries(&self) -> Vec<Entry>;

    /// Store the latest state of one entry (after an install, for example).
    fn update_cached_entry(&self, entry: Entry);

    /// Run a search.
    async fn load_entries(&self, request: &SearchRequest) -> Result<Vec<Entry>>;

    /// Fetch extended metadata for an entry.
    async fn load_entry_details(&self, entry: &Entry) -> Result<Entry>;

    /// Resolve the concrete payload URL of download link `link_id`, returning
    /// the entry with its `payload` set.
    async fn load_payload_link(&self, entry: &Entry, link_id: u32) -> Result<Entry>;

    fn user_can_vote(&self) -> bool {
        false
    }

    /// Rate an entry from 0 to 100.
    async fn vote(&self, _entry: &Entry, _rating: u32) -> Result<()> {
        exn::bail!(ErrorKind::Unsupported("voting"))
    }

    fn user_can_become_fan(&self) -> bool {
        false
    }

    async fn become_fan(&self, _entry: &Entry) -> Result<()> {
        exn::bail!(ErrorKind::Unsupported("becoming a fan"))
    }
}
