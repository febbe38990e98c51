use exn::{OptionExt, ResultExt};
use roxmltree::{Document, Node};
use time::{Date, macros::format_description};
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{Author, Entry, PreviewKind, Source, Status};

const ENTRY_TAG: &str = "stuff";

/// Parses a static feed document into entries listed by `provider_id`.
///
/// The root element name is not checked; every `<stuff>` child is an entry.
/// Entries without a name are skipped. Listed entries always start out
/// [`Status::Downloadable`]; local status is merged in by the provider.
#[instrument(skip(xml), fields(xml_size = xml.as_ref().len()))]
pub fn parse_feed(xml: impl AsRef<[u8]>, provider_id: &str) -> Result<Vec<Entry>> {
    let text = String::from_utf8_lossy(xml.as_ref());
    let document = Document::parse(&text).or_raise(|| ErrorKind::MalformedXml)?;
    let entries: Vec<Entry> = document
        .root_element()
        .children()
        .filter(|node| node.is_element() && node.has_tag_name(ENTRY_TAG))
        .filter_map(|node| match parse_entry(node) {
            Some(mut entry) => {
                entry.provider_id = provider_id.to_string();
                entry.status = Status::Downloadable;
                entry.source = Source::Online;
                Some(entry)
            },
            None => {
                tracing::warn!(position = node.range().start, "Skipping feed entry without a name");
                None
            },
        })
        .collect();
    tracing::debug!(count = entries.len(), "Parsed feed");
    Ok(entries)
}

/// Parses a single `<stuff>` element. The returned entry has no provider ID.
pub fn parse_entry_element(xml: impl AsRef<[u8]>) -> Result<Entry> {
    let text = String::from_utf8_lossy(xml.as_ref());
    let document = Document::parse(&text).or_raise(|| ErrorKind::MalformedXml)?;
    let root = document.root_element();
    if !root.has_tag_name(ENTRY_TAG) {
        exn::bail!(ErrorKind::UnrecognizedRoot(root.tag_name().name().to_string()));
    }
    parse_entry(root).ok_or_raise(|| ErrorKind::MissingField("name"))
}

fn parse_entry(node: Node<'_, '_>) -> Option<Entry> {
    let mut entry = Entry { category: node.attribute("category").unwrap_or_default().to_string(), ..Default::default() };
    let mut small_previews = 0;
    let mut big_previews = 0;

    for child in node.children().filter(Node::is_element) {
        let value = child.text().map(str::trim).unwrap_or_default();
        match child.tag_name().name() {
            "name" => entry.name = value.to_string(),
            "author" => {
                entry.author = Author::new(value)
                    .with_email(child.attribute("email").unwrap_or_default())
                    .with_homepage(child.attribute("homepage").unwrap_or_default());
            },
            "providerid" => entry.provider_id = value.to_string(),
            "homepage" => entry.homepage = value.to_string(),
            "licence" | "license" => entry.license = value.to_string(),
            "version" => entry.version = value.to_string(),
            "rating" => entry.rating = parse_number("rating", value),
            "downloads" => entry.downloads = parse_number("downloads", value),
            "installedfile" => entry.installed_files.push(value.to_string()),
            "id" => entry.unique_id = value.to_string(),
            "releasedate" => entry.release_date = parse_date(value),
            "summary" => entry.summary = value.to_string(),
            "changelog" => entry.changelog = value.to_string(),
            "preview" => {
                small_previews += 1;
                if let Some(kind) = PreviewKind::small(small_previews) {
                    entry.previews.insert(kind, value.to_string());
                }
            },
            "previewBig" => {
                big_previews += 1;
                if let Some(kind) = PreviewKind::big(big_previews) {
                    entry.previews.insert(kind, value.to_string());
                }
            },
            "payload" => entry.payload = value.to_string(),
            "status" => {
                entry.status = value.parse().unwrap_or_else(|_| {
                    tracing::debug!(status = value, "Unknown entry status, treating as downloadable");
                    Status::Downloadable
                });
            },
            other => tracing::trace!(tag = other, "Ignoring unknown feed element"),
        }
    }

    if entry.name.is_empty() {
        return None;
    }
    if entry.unique_id.is_empty() {
        entry.unique_id = if entry.payload.is_empty() { entry.name.clone() } else { entry.payload.clone() };
    }
    Some(entry)
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Option<T> {
    if value.is_empty() {
        return None;
    }
    value.parse().inspect_err(|_| tracing::debug!(field, value, "Ignoring unparseable number")).ok()
}

/// Parses an ISO-8601 date, ignoring any time component.
pub(crate) fn parse_date(value: &str) -> Option<Date> {
    let date = value.get(..10)?;
    Date::parse(date, format_description!("[year]-[month]-[day]"))
        .inspect_err(|_| tracing::debug!(value, "Ignoring unparseable date"))
        .ok()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use time::macros::date;

    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<knewstuff>
  <stuff category="Wallpaper">
    <name>Sunset</name>
    <author email="jane@example.org" homepage="https://jane.example.org">Jane Doe</author>
    <licence>CC-BY-SA</licence>
    <version>1.1</version>
    <rating>84</rating>
    <downloads>1200</downloads>
    <releasedate>2024-06-01</releasedate>
    <summary>Orange sky over a beach</summary>
    <preview>https://example.org/sunset-small.png</preview>
    <previewBig>https://example.org/sunset-big.png</previewBig>
    <payload>https://example.org/sunset.png</payload>
    <id>sunset</id>
  </stuff>
  <stuff>
    <name>Mountains</name>
    <payload>https://example.org/mountains.png</payload>
    <status>installed</status>
  </stuff>
  <stuff>
    <summary>No name, skipped</summary>
  </stuff>
  <other>ignored</other>
</knewstuff>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED, "https://example.org/feed.xml").unwrap();
        assert_eq!(entries.len(), 2);

        let sunset = &entries[0];
        assert_eq!(sunset.unique_id, "sunset");
        assert_eq!(sunset.provider_id, "https://example.org/feed.xml");
        assert_eq!(sunset.category, "Wallpaper");
        assert_eq!(sunset.author.name, "Jane Doe");
        assert_eq!(sunset.author.email.as_deref(), Some("jane@example.org"));
        assert_eq!(sunset.author.homepage.as_deref(), Some("https://jane.example.org"));
        assert_eq!(sunset.license, "CC-BY-SA");
        assert_eq!(sunset.rating, Some(84));
        assert_eq!(sunset.downloads, Some(1200));
        assert_eq!(sunset.release_date, Some(date!(2024 - 06 - 01)));
        assert_eq!(sunset.preview(PreviewKind::Small1), Some("https://example.org/sunset-small.png"));
        assert_eq!(sunset.preview(PreviewKind::Big1), Some("https://example.org/sunset-big.png"));
        assert_eq!(sunset.status, Status::Downloadable);
    }

    #[test]
    fn test_unique_id_falls_back_to_payload() {
        let entries = parse_feed(FEED, "p").unwrap();
        assert_eq!(entries[1].unique_id, "https://example.org/mountains.png");
        // Listings never carry a local status.
        assert_eq!(entries[1].status, Status::Downloadable);
    }

    #[test]
    fn test_single_element_keeps_status() {
        let entry = parse_entry_element("<stuff><name>Only</name><status>installed</status></stuff>").unwrap();
        assert_eq!(entry.unique_id, "Only");
        assert_eq!(entry.status, Status::Installed);
    }

    #[test]
    fn test_single_element_requires_name() {
        let err = parse_entry_element("<stuff><payload>x</payload></stuff>").unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingField("name")));
        let err = parse_entry_element("<thing/>").unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnrecognizedRoot(tag) if tag == "thing"));
    }

    #[test]
    fn test_malformed_feed() {
        let err = parse_feed("<knewstuff><stuff>", "p").unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedXml));
    }

    #[test]
    fn test_empty_feed() {
        assert!(parse_feed("<knewstuff/>", "p").unwrap().is_empty());
    }

    #[rstest]
    #[case("2024-06-01", Some(date!(2024 - 06 - 01)))]
    #[case("2024-06-01T12:00:00Z", Some(date!(2024 - 06 - 01)))]
    #[case("yesterday", None)]
    #[case("", None)]
    fn test_parse_date(#[case] input: &str, #[case] expected: Option<Date>) {
        assert_eq!(parse_date(input), expected);
    }
}
