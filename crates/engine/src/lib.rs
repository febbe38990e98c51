//! Content-acquisition engine.
//!
//! # Architecture
//! - **[`Engine`]**: a cheap handle that sends commands to a single task. The
//!   task owns the providers, the cache and all request state, and reports
//!   back through a channel of [`EngineEvent`]s.
//! - **Providers**: discovered from the configured provider list (or the OCS
//!   endpoint list), initialized concurrently and queried in parallel. Results
//!   are merged with the local registry before they are emitted.
//! - **Installation**: downloading and removing payloads, behind the
//!   [`installation::Installation`] trait.
//! - **[`DownloadManager`]**: a simplified facade for applications that only
//!   search, install and check for updates.

mod engine;
pub mod error;
pub mod event;
pub mod installation;
mod manager;
mod task;

pub use crate::engine::{Engine, EngineEvents, EngineOptions, EngineState, Snapshot};
pub use crate::event::{EngineEvent, Jobs};
pub use crate::manager::{DownloadEvent, DownloadManager};
