//! Local state of the content-acquisition engine.
//!
//! # Architecture
//! - **Registry**: a SQLite table with every entry the user has installed,
//!   updated or deleted, keyed by provider and unique ID. One database file
//!   per application.
//! - **Request index**: result pages of recent searches, kept in memory only
//!   so that a reload can be answered without touching the network.
//!
//! [`Cache`] combines both and is owned by a single engine task.

mod cache;
mod db;
pub mod error;
mod models;
mod repo;

pub use crate::cache::{Cache, Flushed};
pub use crate::db::Database;
pub use crate::repo::{Applied, Repository};
