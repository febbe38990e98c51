//! Engine Error Types
//!
//! Errors from providers and the cache are wrapped as children, so the full
//! tree is still available when printed with `{:?}`.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Start-up Errors
/// - [`ErrorKind::Configuration`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Transport`]
///
/// ### Installation Errors
/// - [`ErrorKind::InvalidPayload`]
/// - [`ErrorKind::Download`]
/// - [`ErrorKind::InvalidPath`]
/// - [`ErrorKind::Io`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The application configuration is missing or malformed.
    #[display("configuration error")]
    Configuration,
    /// The registry could not be opened, read or written.
    #[display("cache error")]
    Cache,
    /// No document transport could be set up.
    #[display("transport unavailable")]
    Transport,
    /// The engine task has stopped.
    #[display("engine is closed")]
    Closed,
    #[display("entry has no usable payload: {_0}")]
    InvalidPayload(#[error(not(source))] String),
    #[display("download of {_0} failed")]
    Download(#[error(not(source))] String),
    #[display("refusing to touch {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download(_) | Self::Io(_))
    }
}
