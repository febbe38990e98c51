mod cached;
pub mod error;
pub mod fetch;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod ocs;
mod provider;
mod static_feed;

#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockProvider;
pub use crate::ocs::OcsProvider;
pub use crate::provider::Provider;
pub use crate::static_feed::StaticFeedProvider;
use std::sync::Arc;

pub type ProviderHandle = Arc<dyn Provider + Send + Sync>;
