use knewstuff_feed::models::{self as feed, PreviewKind};

#[derive(facet::Facet)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct AuthorProxy {
    #[facet(rename = "n")]
    name: String,
    #[facet(rename = "e", default, transparent, skip_serializing_if = Option::is_none)]
    email: Option<String>,
    #[facet(rename = "h", default, transparent, skip_serializing_if = Option::is_none)]
    homepage: Option<String>,
}
impl From<&feed::Author> for AuthorProxy {
    fn from(author: &feed::Author) -> Self {
        Self { name: author.name.clone(), email: author.email.clone(), homepage: author.homepage.clone() }
    }
}
impl From<AuthorProxy> for feed::Author {
    fn from(author: AuthorProxy) -> Self {
        Self { name: author.name, email: author.email, homepage: author.homepage }
    }
}

#[derive(facet::Facet)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct PreviewProxy {
    #[facet(rename = "k")]
    kind: String,
    #[facet(rename = "u")]
    url: String,
}
impl From<(&PreviewKind, &String)> for PreviewProxy {
    fn from((kind, url): (&PreviewKind, &String)) -> Self {
        Self { kind: kind.as_str().to_string(), url: url.clone() }
    }
}
impl PreviewProxy {
    /// Unknown preview kinds (from a newer schema) are dropped.
    pub(crate) fn into_pair(self) -> Option<(PreviewKind, String)> {
        PreviewKind::from_str_opt(&self.kind).map(|kind| (kind, self.url))
    }
}

#[derive(facet::Facet)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct DownloadLinkProxy {
    id: u32,
    #[facet(rename = "n")]
    name: String,
    #[facet(rename = "p", default, transparent, skip_serializing_if = Option::is_none)]
    price_amount: Option<f64>,
    #[facet(rename = "t", default, transparent, skip_serializing_if = Option::is_none)]
    distribution_type: Option<String>,
    #[facet(rename = "d", default, transparent, skip_serializing_if = Option::is_none)]
    description: Option<String>,
}
impl From<&feed::DownloadLink> for DownloadLinkProxy {
    fn from(link: &feed::DownloadLink) -> Self {
        Self {
            id: link.id,
            name: link.name.clone(),
            price_amount: link.price_amount,
            distribution_type: link.distribution_type.clone(),
            description: link.description.clone(),
        }
    }
}
impl From<DownloadLinkProxy> for feed::DownloadLink {
    fn from(link: DownloadLinkProxy) -> Self {
        Self {
            id: link.id,
            name: link.name,
            price_amount: link.price_amount,
            distribution_type: link.distribution_type,
            description: link.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_json::{from_str as from_json, to_string as to_json};
    use rstest::rstest;

    #[rstest]
    #[case(AuthorProxy{name: "Jane".to_string(), email: None, homepage: None}, r#"{"n":"Jane"}"#)]
    #[case(AuthorProxy{name: "Jane".to_string(), email: Some("jane@example.org".to_string()), homepage: None}, r#"{"n":"Jane","e":"jane@example.org"}"#)]
    fn test_author_serialize(#[case] input: AuthorProxy, #[case] expected: impl AsRef<str>) {
        let json = to_json(&input).unwrap();
        assert_eq!(json.as_str(), expected.as_ref());
    }

    #[test]
    fn test_author_deserialize() {
        let obj = from_json::<AuthorProxy>(r#"{"n":"Jane","h":"https://jane.example.org"}"#).unwrap();
        assert_eq!(
            obj,
            AuthorProxy { name: "Jane".to_string(), email: None, homepage: Some("https://jane.example.org".to_string()) }
        );
    }

    #[test]
    fn test_preview_kinds_survive() {
        let proxies = vec![
            PreviewProxy { kind: "small1".to_string(), url: "a.png".to_string() },
            PreviewProxy { kind: "gigantic".to_string(), url: "b.png".to_string() },
        ];
        let json = to_json(&proxies).unwrap();
        assert_eq!(json.as_str(), r#"[{"k":"small1","u":"a.png"},{"k":"gigantic","u":"b.png"}]"#);
        let pairs: Vec<_> =
            from_json::<Vec<PreviewProxy>>(&json).unwrap().into_iter().filter_map(PreviewProxy::into_pair).collect();
        assert_eq!(pairs, vec![(PreviewKind::Small1, "a.png".to_string())]);
    }

    #[test]
    fn test_download_link_serialize() {
        let link = DownloadLinkProxy {
            id: 1,
            name: "file.png".to_string(),
            price_amount: None,
            distribution_type: None,
            description: None,
        };
        assert_eq!(to_json(&link).unwrap().as_str(), r#"{"id":1,"n":"file.png"}"#);
    }
}
