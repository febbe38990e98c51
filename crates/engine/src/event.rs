use knewstuff_feed::models::{Entry, PreviewKind, SearchRequest};

/// Everything an engine reports to its owner.
///
/// Events are delivered in the order the engine produced them.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Every discovered provider is initialized. Sent exactly once.
    ProvidersLoaded,
    /// Discovery is over and no provider could be initialized. Requests will
    /// never be answered. Sent at most once, never together with
    /// [`EngineEvent::ProvidersLoaded`].
    ProvidersUnavailable,
    /// One page of results for a search (or an installed listing).
    EntriesLoaded { request: SearchRequest, entries: Vec<Entry> },
    /// Entries that have an update available.
    UpdateableEntriesLoaded(Vec<Entry>),
    /// A provider failed to answer a search. Every dispatched search ends in
    /// either this or [`EngineEvent::EntriesLoaded`].
    LoadingFailed { provider: String, request: SearchRequest },
    /// The status (or any other field) of an entry changed.
    EntryChanged(Entry),
    DetailsLoaded(Entry),
    PreviewLoaded { entry: Entry, kind: PreviewKind, data: Vec<u8> },
    /// Displayed results are about to be replaced.
    ResetView,
    /// A provider needs credentials before it can do what was asked.
    AuthenticationMissing { provider: String, message: String },
    /// A user-facing error message.
    Error(String),
    /// A user-facing informational message.
    Information(String),
    Busy(String),
    Idle,
}

/// Outstanding work, by kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Jobs {
    pub data: usize,
    pub previews: usize,
    pub installs: usize,
}
impl Jobs {
    /// The busy message for the current jobs, most important kind first.
    pub fn status(&self) -> Option<String> {
        if self.data > 0 {
            Some("Loading data".to_string())
        } else if self.previews == 1 {
            Some("Loading one preview".to_string())
        } else if self.previews > 1 {
            Some(format!("Loading {} previews", self.previews))
        } else if self.installs > 0 {
            Some("Installing".to_string())
        } else {
            None
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status().is_none()
    }
}
