use exn::ResultExt;
use roxmltree::{Document, Node};
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{FeedSort, ProviderDescriptor, ProviderList, ProviderSchema};

/// Parses a provider list document.
///
/// The root element decides the schema: `<providers>` lists OCS providers
/// only, while `<ghnsproviders>`/`<knewstuffproviders>` carry a `type`
/// attribute per entry. Any other root is an error.
#[instrument(skip(xml), fields(xml_size = xml.as_ref().len()))]
pub fn parse_provider_list(xml: impl AsRef<[u8]>) -> Result<ProviderList> {
    let text = String::from_utf8_lossy(xml.as_ref());
    let document = Document::parse(&text).or_raise(|| ErrorKind::MalformedXml)?;
    let root = document.root_element();
    let schema = match root.tag_name().name() {
        "providers" => ProviderSchema::Ocs,
        "ghnsproviders" | "knewstuffproviders" => ProviderSchema::Generic,
        other => exn::bail!(ErrorKind::UnrecognizedRoot(other.to_string())),
    };
    let providers: Vec<ProviderDescriptor> = root.children().filter(Node::is_element).map(descriptor_from_node).collect();
    tracing::debug!(count = providers.len(), ?schema, "Parsed provider list");
    Ok(ProviderList { schema, providers })
}

/// Parses a standalone provider element.
pub fn parse_provider_descriptor(xml: impl AsRef<[u8]>) -> Result<ProviderDescriptor> {
    let text = String::from_utf8_lossy(xml.as_ref());
    let document = Document::parse(&text).or_raise(|| ErrorKind::MalformedXml)?;
    Ok(descriptor_from_node(document.root_element()))
}

fn descriptor_from_node(node: Node<'_, '_>) -> ProviderDescriptor {
    let attribute = |name: &str| node.attribute(name).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
    let child_text = |name: &str| {
        node.children()
            .find(|c| c.is_element() && c.has_tag_name(name))
            .and_then(|c| c.text())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let download_urls = FeedSort::ALL
        .into_iter()
        .filter_map(|sort| attribute(sort.attribute()).map(|url| (sort, url)))
        .collect();
    let services = node
        .children()
        .find(|c| c.is_element() && c.has_tag_name("services"))
        .map(|services| {
            services.children().filter(Node::is_element).map(|s| s.tag_name().name().to_string()).collect()
        })
        .unwrap_or_default();

    ProviderDescriptor {
        tag: node.tag_name().name().to_string(),
        kind_attribute: attribute("type").map(|t| t.to_lowercase()),
        title: child_text("title"),
        upload_url: attribute("uploadurl"),
        no_upload_url: attribute("nouploadurl"),
        download_urls,
        icon: attribute("icon").or_else(|| child_text("icon")),
        ocs_id: child_text("id"),
        location: child_text("location"),
        name: child_text("name"),
        services,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::models::ProviderKind;

    const GENERIC: &str = r#"<?xml version="1.0"?>
<ghnsproviders>
  <provider downloadurl="https://example.org/feed.xml" downloadurl-latest="https://example.org/latest.xml"
            nouploadurl="https://example.org/no-upload" icon="https://example.org/icon.png">
    <title>Example Wallpapers</title>
  </provider>
  <provider type="REST">
    <location>https://api.example.org/ocs/v1/</location>
    <name>Example OCS</name>
    <services><content ocsversion="1.6"/><person/></services>
  </provider>
</ghnsproviders>"#;

    #[test]
    fn test_parse_generic_list() {
        let list = parse_provider_list(GENERIC).unwrap();
        assert_eq!(list.schema, ProviderSchema::Generic);
        let kinds: Vec<_> = list.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![ProviderKind::StaticFeed, ProviderKind::Ocs]);

        let feed = &list.providers[0];
        assert_eq!(feed.title.as_deref(), Some("Example Wallpapers"));
        assert_eq!(feed.download_url(FeedSort::Default), Some("https://example.org/feed.xml"));
        assert_eq!(feed.download_url(FeedSort::Latest), Some("https://example.org/latest.xml"));
        assert_eq!(feed.download_url(FeedSort::Score), None);
        assert_eq!(feed.no_upload_url.as_deref(), Some("https://example.org/no-upload"));
        assert_eq!(feed.upload_url, None);
        assert_eq!(feed.icon.as_deref(), Some("https://example.org/icon.png"));

        let ocs = &list.providers[1];
        assert_eq!(ocs.kind_attribute.as_deref(), Some("rest"));
        assert_eq!(ocs.location.as_deref(), Some("https://api.example.org/ocs/v1/"));
        assert!(ocs.has_service("content"));
    }

    #[test]
    fn test_ocs_root_makes_every_entry_ocs() {
        let list = parse_provider_list(
            "<providers><provider><location>https://a.example/</location></provider><provider/></providers>",
        )
        .unwrap();
        assert_eq!(list.schema, ProviderSchema::Ocs);
        assert!(list.iter().all(|(kind, _)| kind == ProviderKind::Ocs));
    }

    #[rstest]
    #[case("<html><body/></html>", "html")]
    #[case("<provider/>", "provider")]
    fn test_unrecognised_root(#[case] xml: &str, #[case] root: &str) {
        let err = parse_provider_list(xml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnrecognizedRoot(tag) if tag == root));
    }

    #[test]
    fn test_malformed_list() {
        let err = parse_provider_list("not xml at all").unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedXml));
    }

    #[test]
    fn test_blank_attributes_are_absent() {
        let descriptor = parse_provider_descriptor(r#"<provider uploadurl="  " downloadurl="x"/>"#).unwrap();
        assert_eq!(descriptor.upload_url, None);
        assert_eq!(descriptor.download_url(FeedSort::Default), Some("x"));
    }
}
