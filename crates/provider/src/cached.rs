use knewstuff_feed::models::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A provider's running list of entries it has seen.
///
/// Order is first-seen, except that re-listed entries move to the end.
#[derive(Debug, Default)]
pub(crate) struct CachedEntries {
    entries: Mutex<Vec<Entry>>,
}

impl CachedEntries {
    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn replace(&self, entries: Vec<Entry>) {
        *self.lock() = entries;
    }

    pub(crate) fn snapshot(&self) -> Vec<Entry> {
        self.lock().clone()
    }

    pub(crate) fn filtered(&self, predicate: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        self.lock().iter().filter(|e| predicate(e)).cloned().collect()
    }

    pub(crate) fn find(&self, entry: &Entry) -> Option<Entry> {
        self.lock().iter().find(|cached| cached.is_same_item(entry)).cloned()
    }

    /// Reconcile a fresh listing against the running list, store the
    /// reconciled entries, and return them in listing order.
    pub(crate) fn merge(&self, listing: Vec<Entry>) -> Vec<Entry> {
        let mut entries = self.lock();
        listing
            .into_iter()
            .map(|mut entry| {
                if let Some(position) = entries.iter().position(|cached| cached.is_same_item(&entry)) {
                    let cached = entries.remove(position);
                    entry.reconcile_with(&cached);
                }
                entries.push(entry.clone());
                entry
            })
            .collect()
    }

    /// Store a single entry, replacing any earlier copy in place.
    pub(crate) fn upsert(&self, entry: Entry) {
        let mut entries = self.lock();
        match entries.iter_mut().find(|cached| cached.is_same_item(&entry)) {
            Some(cached) => *cached = entry,
            None => entries.push(entry),
        }
    }
}
