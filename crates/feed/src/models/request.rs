use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use super::{Entry, Status};
use crate::error::{Error, ErrorKind};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Result ordering, plus the two local-status listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SortMode {
    Newest,
    #[default]
    Rating,
    Alphabetical,
    Downloads,
    /// Entries installed locally, answered without network access
    Installed,
    /// Installed entries with a newer remote version
    Updates,
}
impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Rating => "rating",
            SortMode::Alphabetical => "alphabetical",
            SortMode::Downloads => "downloads",
            SortMode::Installed => "installed",
            SortMode::Updates => "updates",
        }
    }

    /// Sort modes whose results depend on local status and are never cached
    /// in the transient request index.
    pub fn is_local_status(&self) -> bool {
        matches!(self, SortMode::Installed | SortMode::Updates)
    }
}
impl FromStr for SortMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "newest" | "latest" => Self::Newest,
            "rating" | "score" => Self::Rating,
            "alphabetical" | "name" => Self::Alphabetical,
            "downloads" => Self::Downloads,
            "installed" => Self::Installed,
            "updates" => Self::Updates,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "sort",
                value: s.to_string(),
            }),
        })
    }
}
impl Display for SortMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// A search against one or more providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchRequest {
    pub sort_mode: SortMode,
    /// Category filter; empty means no filter
    pub categories: Vec<String>,
    pub search_term: String,
    /// Zero-based
    pub page: u32,
    pub page_size: u32,
}
impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::default(),
            categories: Vec::new(),
            search_term: String::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
impl SearchRequest {
    pub fn new(sort_mode: SortMode) -> Self {
        Self { sort_mode, ..Default::default() }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Key of the request with the page stripped, for indexing result pages.
    pub fn without_page(&self) -> RequestKey {
        RequestKey {
            sort_mode: self.sort_mode,
            categories: self.categories.clone(),
            search_term: self.search_term.clone(),
            page_size: self.page_size,
        }
    }

    /// Whether an entry belongs in the results of this request, ignoring
    /// ordering and pagination.
    pub fn includes(&self, entry: &Entry) -> bool {
        if self.sort_mode == SortMode::Updates && entry.status != Status::Updateable {
            return false;
        }
        if self.sort_mode == SortMode::Installed && !entry.status.is_installed() {
            return false;
        }
        if !self.categories.is_empty()
            && !entry.category.is_empty()
            && !self.categories.iter().any(|c| c.eq_ignore_ascii_case(&entry.category))
        {
            return false;
        }
        entry.matches_term(&self.search_term)
    }
}
impl Display for SearchRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} page {} (size {})", self.sort_mode, self.page, self.page_size)?;
        if !self.search_term.is_empty() {
            write!(f, " term {:?}", self.search_term)?;
        }
        if !self.categories.is_empty() {
            write!(f, " in [{}]", self.categories.join(", "))?;
        }
        Ok(())
    }
}

/// A [`SearchRequest`] without its page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub sort_mode: SortMode,
    pub categories: Vec<String>,
    pub search_term: String,
    pub page_size: u32,
}
impl RequestKey {
    pub fn with_page(&self, page: u32) -> SearchRequest {
        SearchRequest {
            sort_mode: self.sort_mode,
            categories: self.categories.clone(),
            search_term: self.search_term.clone(),
            page,
            page_size: self.page_size,
        }
    }
}
