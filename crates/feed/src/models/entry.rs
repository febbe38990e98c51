use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
};

use time::Date;

use super::{Author, DownloadLink, PreviewKind, Source, Status};

/// Identity of an entry: unique IDs are only unique within one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub provider_id: String,
    pub unique_id: String,
}
impl EntryKey {
    pub fn new(provider_id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self { provider_id: provider_id.into(), unique_id: unique_id.into() }
    }
}
impl Display for EntryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}#{}", self.provider_id, self.unique_id)
    }
}

/// One piece of downloadable content and its lifecycle status.
///
/// Two entries are the same item when their provider ID and unique ID match;
/// every other field is payload. `PartialEq`, `Eq` and `Hash` all follow that
/// identity, so use [`Entry::same_fields`] to compare content.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    /// Stable, provider-scoped identifier
    pub unique_id: String,
    /// ID of the provider the entry was listed by
    pub provider_id: String,
    pub name: String,
    pub category: String,
    pub license: String,
    /// Version that is installed (or listed, when not installed)
    pub version: String,
    /// Newer remote version, set when the entry is [`Status::Updateable`]
    pub update_version: String,
    pub release_date: Option<Date>,
    pub update_release_date: Option<Date>,
    pub author: Author,
    pub summary: String,
    pub short_summary: String,
    pub changelog: String,
    pub homepage: String,
    /// Reference to the default payload (usually a URL)
    pub payload: String,
    pub previews: BTreeMap<PreviewKind, String>,
    pub rating: Option<u32>,
    pub downloads: Option<u64>,
    pub fans: Option<u64>,
    pub donation_link: String,
    /// Files written to disk by the last install
    pub installed_files: Vec<String>,
    pub download_links: Vec<DownloadLink>,
    pub status: Status,
    pub source: Source,
}

impl Entry {
    pub fn new(provider_id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self { provider_id: provider_id.into(), unique_id: unique_id.into(), ..Default::default() }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(&self.provider_id, &self.unique_id)
    }

    pub fn is_same_item(&self, other: &Entry) -> bool {
        self.provider_id == other.provider_id && self.unique_id == other.unique_id
    }

    /// Field-by-field comparison, ignoring only the transient [`Source`].
    pub fn same_fields(&self, other: &Entry) -> bool {
        self.is_same_item(other)
            && self.name == other.name
            && self.category == other.category
            && self.license == other.license
            && self.version == other.version
            && self.update_version == other.update_version
            && self.release_date == other.release_date
            && self.update_release_date == other.update_release_date
            && self.author == other.author
            && self.summary == other.summary
            && self.short_summary == other.short_summary
            && self.changelog == other.changelog
            && self.homepage == other.homepage
            && self.payload == other.payload
            && self.previews == other.previews
            && self.rating == other.rating
            && self.downloads == other.downloads
            && self.fans == other.fans
            && self.donation_link == other.donation_link
            && self.installed_files == other.installed_files
            && self.download_links == other.download_links
            && self.status == other.status
    }

    pub fn preview(&self, kind: PreviewKind) -> Option<&str> {
        self.previews.get(&kind).map(String::as_str).filter(|url| !url.is_empty())
    }

    /// Case-insensitive substring match on name, summary and author name.
    /// An empty term matches everything.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        let needle = term.to_lowercase();
        [&self.name, &self.summary, &self.author.name]
            .into_iter()
            .any(|haystack| haystack.to_lowercase().contains(&needle))
    }

    /// Merges what is known locally about this item into a fresh remote listing.
    ///
    /// If the local copy is installed and the listing disagrees on version or
    /// release date, the listing becomes [`Status::Updateable`]: the installed
    /// values stay in `version`/`release_date` and the remote ones move to the
    /// `update_*` fields. Otherwise the listing inherits the local status.
    pub fn reconcile_with(&mut self, cached: &Entry) {
        debug_assert!(self.is_same_item(cached));
        self.installed_files = cached.installed_files.clone();
        if cached.status.is_installed() && (self.version != cached.version || self.release_date != cached.release_date)
        {
            self.update_version = std::mem::replace(&mut self.version, cached.version.clone());
            self.update_release_date = std::mem::replace(&mut self.release_date, cached.release_date);
            self.status = Status::Updateable;
        } else {
            self.status = cached.status;
        }
    }

    /// After an update has been installed, the update version becomes the
    /// installed version.
    pub fn promote_update(&mut self) {
        if !self.update_version.is_empty() {
            self.version = std::mem::take(&mut self.update_version);
        }
        if let Some(date) = self.update_release_date.take() {
            self.release_date = Some(date);
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_item(other)
    }
}
impl Eq for Entry {}
impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider_id.hash(state);
        self.unique_id.hash(state);
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({})", self.name, self.key())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;
    use time::macros::date;

    use super::*;

    fn installed(version: &str) -> Entry {
        let mut entry = Entry::new("https://example.org/feed.xml", "wallpaper-1");
        entry.name = "Sunset".to_string();
        entry.version = version.to_string();
        entry.release_date = Some(date!(2024 - 01 - 01));
        entry.status = Status::Installed;
        entry.installed_files = vec!["/home/user/.local/share/wallpapers/sunset.png".to_string()];
        entry
    }

    #[test]
    fn test_identity_ignores_other_fields() {
        let a = installed("1.0");
        let mut b = Entry::new("https://example.org/feed.xml", "wallpaper-1");
        b.name = "Something else entirely".to_string();
        assert_eq!(a, b);
        assert!(!a.same_fields(&b));

        let set: HashSet<Entry> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_same_unique_id_different_provider_is_a_different_item() {
        let a = Entry::new("provider-a", "1");
        let b = Entry::new("provider-b", "1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_newer_listing_of_installed_entry_becomes_updateable() {
        let cached = installed("1.0");
        let mut listing = Entry::new(&cached.provider_id, &cached.unique_id);
        listing.version = "1.1".to_string();
        listing.release_date = Some(date!(2024 - 06 - 01));

        listing.reconcile_with(&cached);

        assert_eq!(listing.status, Status::Updateable);
        assert_eq!(listing.version, "1.0");
        assert_eq!(listing.update_version, "1.1");
        assert_eq!(listing.release_date, Some(date!(2024 - 01 - 01)));
        assert_eq!(listing.update_release_date, Some(date!(2024 - 06 - 01)));
        assert_eq!(listing.installed_files, cached.installed_files);
    }

    #[test]
    fn test_identical_listing_inherits_cached_status() {
        let cached = installed("1.0");
        let mut listing = Entry::new(&cached.provider_id, &cached.unique_id);
        listing.version = "1.0".to_string();
        listing.release_date = cached.release_date;

        listing.reconcile_with(&cached);

        assert_eq!(listing.status, Status::Installed);
        assert!(listing.update_version.is_empty());
    }

    #[test]
    fn test_deleted_entry_is_not_updateable() {
        let mut cached = installed("1.0");
        cached.status = Status::Deleted;
        let mut listing = Entry::new(&cached.provider_id, &cached.unique_id);
        listing.version = "2.0".to_string();

        listing.reconcile_with(&cached);

        assert_eq!(listing.status, Status::Deleted);
        assert_eq!(listing.version, "2.0");
    }

    #[test]
    fn test_promote_update_after_install() {
        let cached = installed("1.0");
        let mut listing = Entry::new(&cached.provider_id, &cached.unique_id);
        listing.version = "1.1".to_string();
        listing.release_date = Some(date!(2024 - 06 - 01));
        listing.reconcile_with(&cached);

        listing.promote_update();

        assert_eq!(listing.version, "1.1");
        assert_eq!(listing.release_date, Some(date!(2024 - 06 - 01)));
        assert!(listing.update_version.is_empty());
        assert_eq!(listing.update_release_date, None);
    }

    #[rstest]
    #[case("", true)]
    #[case("sun", true)]
    #[case("SUNSET", true)]
    #[case("jane", true)]
    #[case("beach", true)]
    #[case("mountain", false)]
    fn test_matches_term(#[case] term: &str, #[case] expected: bool) {
        let mut entry = installed("1.0");
        entry.summary = "Orange sky over a beach".to_string();
        entry.author = Author::new("Jane Doe");
        assert_eq!(entry.matches_term(term), expected);
    }
}
