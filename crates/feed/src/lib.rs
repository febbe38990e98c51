//! Data model shared by every part of the content client: entries, search
//! requests and provider descriptors, plus parsers for the two XML documents
//! the client reads directly (static feeds and provider lists).

pub mod error;
mod feed;
pub mod models;
mod providers;

pub use crate::feed::{parse_entry_element, parse_feed};
pub use crate::providers::{parse_provider_descriptor, parse_provider_list};
