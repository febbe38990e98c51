mod author;
mod descriptor;
mod entry;
mod link;
mod request;
mod status;

pub use self::author::Author;
pub use self::descriptor::{FeedSort, ProviderDescriptor, ProviderKind, ProviderList, ProviderSchema};
pub use self::entry::{Entry, EntryKey};
pub use self::link::{DownloadLink, PreviewKind};
pub use self::request::{DEFAULT_PAGE_SIZE, RequestKey, SearchRequest, SortMode};
pub use self::status::{Source, Status};
