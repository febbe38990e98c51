use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Which provider implementation a descriptor is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Open Collaboration Services (REST) provider
    Ocs,
    /// Fixed XML download URLs per sort order
    StaticFeed,
}
impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ocs => "ocs",
            ProviderKind::StaticFeed => "static",
        }
    }
}
impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Sort-keyed download URLs of a static feed provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedSort {
    /// `downloadurl`
    Default,
    /// `downloadurl-latest`
    Latest,
    /// `downloadurl-score`
    Score,
    /// `downloadurl-downloads`
    Downloads,
}
impl FeedSort {
    pub const ALL: [FeedSort; 4] = [FeedSort::Default, FeedSort::Latest, FeedSort::Score, FeedSort::Downloads];

    pub fn attribute(&self) -> &'static str {
        match self {
            FeedSort::Default => "downloadurl",
            FeedSort::Latest => "downloadurl-latest",
            FeedSort::Score => "downloadurl-score",
            FeedSort::Downloads => "downloadurl-downloads",
        }
    }
}

/// Document flavour of a provider list, decided by its root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSchema {
    /// `<providers>`: every entry is an OCS provider
    Ocs,
    /// `<ghnsproviders>` or `<knewstuffproviders>`: kind given per entry
    Generic,
}

/// One provider element from a provider list, not yet validated.
///
/// Carries the union of what both provider kinds read; each implementation
/// validates the parts it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Element tag, normally `provider`
    pub tag: String,
    /// Lowercased `type` attribute, if any
    pub kind_attribute: Option<String>,
    /// Display name from the `title` child
    pub title: Option<String>,
    pub upload_url: Option<String>,
    pub no_upload_url: Option<String>,
    pub download_urls: BTreeMap<FeedSort, String>,
    pub icon: Option<String>,
    /// OCS `id` child
    pub ocs_id: Option<String>,
    /// OCS base URL (`location` child)
    pub location: Option<String>,
    /// OCS `name` child
    pub name: Option<String>,
    /// OCS service names found under `services`
    pub services: Vec<String>,
}
impl ProviderDescriptor {
    /// Decides the provider kind for this element under the given schema.
    pub fn kind(&self, schema: ProviderSchema) -> ProviderKind {
        match (schema, self.kind_attribute.as_deref()) {
            (ProviderSchema::Ocs, _) | (_, Some("rest")) => ProviderKind::Ocs,
            _ => ProviderKind::StaticFeed,
        }
    }

    pub fn download_url(&self, sort: FeedSort) -> Option<&str> {
        self.download_urls.get(&sort).map(String::as_str)
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }
}

/// Parsed provider list document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderList {
    pub schema: ProviderSchema,
    pub providers: Vec<ProviderDescriptor>,
}
impl ProviderList {
    pub fn iter(&self) -> impl Iterator<Item = (ProviderKind, &ProviderDescriptor)> {
        self.providers.iter().map(|d| (d.kind(self.schema), d))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ProviderSchema::Ocs, None, ProviderKind::Ocs)]
    #[case(ProviderSchema::Ocs, Some("static"), ProviderKind::Ocs)]
    #[case(ProviderSchema::Generic, Some("rest"), ProviderKind::Ocs)]
    #[case(ProviderSchema::Generic, None, ProviderKind::StaticFeed)]
    #[case(ProviderSchema::Generic, Some("other"), ProviderKind::StaticFeed)]
    fn test_kind_by_schema(
        #[case] schema: ProviderSchema,
        #[case] attribute: Option<&str>,
        #[case] expected: ProviderKind,
    ) {
        let descriptor = ProviderDescriptor { kind_attribute: attribute.map(str::to_string), ..Default::default() };
        assert_eq!(descriptor.kind(schema), expected);
    }
}
