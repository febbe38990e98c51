use std::fmt::{Display, Formatter, Result as FmtResult};

/// One of the downloadable payload variants an entry offers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadLink {
    /// Provider-assigned link number, starting at 1
    pub id: u32,
    pub name: String,
    /// Price in the provider's currency; `None` for free downloads
    pub price_amount: Option<f64>,
    pub distribution_type: Option<String>,
    pub description: Option<String>,
}
impl DownloadLink {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), ..Default::default() }
    }

    pub fn is_priced(&self) -> bool {
        self.price_amount.is_some_and(|price| price > 0.0)
    }
}

/// Preview image slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreviewKind {
    Small1,
    Small2,
    Small3,
    Big1,
    Big2,
    Big3,
}
impl PreviewKind {
    pub const ALL: [PreviewKind; 6] = [
        PreviewKind::Small1,
        PreviewKind::Small2,
        PreviewKind::Small3,
        PreviewKind::Big1,
        PreviewKind::Big2,
        PreviewKind::Big3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewKind::Small1 => "small1",
            PreviewKind::Small2 => "small2",
            PreviewKind::Small3 => "small3",
            PreviewKind::Big1 => "big1",
            PreviewKind::Big2 => "big2",
            PreviewKind::Big3 => "big3",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Small preview slot for a 1-based index.
    pub fn small(index: usize) -> Option<Self> {
        match index {
            1 => Some(PreviewKind::Small1),
            2 => Some(PreviewKind::Small2),
            3 => Some(PreviewKind::Small3),
            _ => None,
        }
    }

    /// Big preview slot for a 1-based index.
    pub fn big(index: usize) -> Option<Self> {
        match index {
            1 => Some(PreviewKind::Big1),
            2 => Some(PreviewKind::Big2),
            3 => Some(PreviewKind::Big3),
            _ => None,
        }
    }
}
impl Display for PreviewKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_kind_names_are_unique() {
        for kind in PreviewKind::ALL {
            assert_eq!(PreviewKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(PreviewKind::from_str_opt("huge"), None);
        assert_eq!(PreviewKind::small(4), None);
    }

    #[test]
    fn test_free_links_are_not_priced() {
        let mut link = DownloadLink::new(1, "wallpaper.png");
        assert!(!link.is_priced());
        link.price_amount = Some(0.0);
        assert!(!link.is_priced());
        link.price_amount = Some(2.5);
        assert!(link.is_priced());
    }
}
