//! Application configuration (`.knsrc`) for knewstuff.
//!
//! Every application that offers downloadable content ships a small
//! configuration file naming the categories it wants, where the provider list
//! lives and where payloads are installed. The file's stem is the
//! application's identity, used among other things to name its registry.

pub mod error;
mod knsrc;
mod paths;

pub use crate::knsrc::{Config, ENV_PREFIX, InstallTarget, SectionVersion};
pub use crate::paths::Paths;
